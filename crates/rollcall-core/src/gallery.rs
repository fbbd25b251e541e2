//! In-memory signature gallery with whole-snapshot reload.
//!
//! Readers take an `Arc` to an immutable [`GallerySnapshot`]; `reload`
//! builds a complete new snapshot from the store and swaps the pointer.
//! A reader therefore sees either the old gallery or the new one, never a
//! half-populated map. Reloads are serialized, so a slow reload can never
//! swap in a snapshot older than one already published.

use crate::store::{SignatureStore, StoreError};
use crate::types::{IdentityKey, Signature};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Immutable identity → signature mapping, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GallerySnapshot {
    entries: BTreeMap<IdentityKey, Signature>,
}

impl GallerySnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = (IdentityKey, Signature)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&Signature> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &Signature)> {
        self.entries.iter()
    }
}

/// Process-wide gallery handle, shared as `Arc<Gallery>`.
pub struct Gallery {
    store: Arc<dyn SignatureStore>,
    current: RwLock<Arc<GallerySnapshot>>,
    /// Held across read-and-swap in `reload`; readers never take it.
    reload_lock: Mutex<()>,
}

impl Gallery {
    /// Build the startup gallery. A store that cannot be read yields an
    /// empty gallery; the error is logged.
    pub fn load(store: Arc<dyn SignatureStore>) -> Self {
        let snapshot = match Self::rebuild(store.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "failed to load signature gallery; starting empty");
                GallerySnapshot::default()
            }
        };
        tracing::info!(entries = snapshot.len(), "signature gallery loaded");

        Self {
            store,
            current: RwLock::new(Arc::new(snapshot)),
            reload_lock: Mutex::new(()),
        }
    }

    /// Read every entry from the store into a fresh snapshot.
    pub fn rebuild(store: &dyn SignatureStore) -> Result<GallerySnapshot, StoreError> {
        Ok(GallerySnapshot {
            entries: store.get_all()?,
        })
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rebuild from the store and swap in the result.
    ///
    /// On a store error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<usize, StoreError> {
        let _reloading = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = match Self::rebuild(self.store.as_ref()) {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                tracing::error!(error = %e, "gallery reload failed; keeping previous snapshot");
                return Err(e);
            }
        };

        let count = fresh.len();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        tracing::info!(entries = count, "signature gallery reloaded");
        Ok(count)
    }
}
