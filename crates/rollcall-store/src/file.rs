//! Flat-file signature store: one JSON object `{roll_number: [f32, ...]}`.

use rollcall_core::store::{SignatureStore, StoreError};
use rollcall_core::{IdentityKey, Signature};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub struct FileSignatureStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles of `upsert`.
    write_lock: Mutex<()>,
}

impl FileSignatureStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %path.display(), "using flat-file signature store");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<IdentityKey, Signature>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let entries: BTreeMap<String, Vec<f32>> =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display())))?;

        let mut map = BTreeMap::new();
        for (raw_key, values) in entries {
            match raw_key.parse::<IdentityKey>() {
                Ok(key) => {
                    map.insert(key, Signature::new(values));
                }
                Err(e) => tracing::warn!(key = %raw_key, error = %e, "skipping invalid identity in store"),
            }
        }
        Ok(map)
    }

    /// Write via a sibling temp file and rename, so a crash never leaves a truncated store.
    fn write_map(&self, map: &BTreeMap<IdentityKey, Signature>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(map).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SignatureStore for FileSignatureStore {
    fn get_all(&self) -> Result<BTreeMap<IdentityKey, Signature>, StoreError> {
        self.read_map()
    }

    fn upsert(&self, key: &IdentityKey, signature: &Signature) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        map.insert(key.clone(), signature.clone());
        self.write_map(&map)
    }
}
