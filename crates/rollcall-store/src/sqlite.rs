//! SQLite signature store: one row per identity, signature as a
//! little-endian `f32` blob.

use rollcall_core::store::{SignatureStore, StoreError};
use rollcall_core::{IdentityKey, Signature};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_embeddings (
    roll_number TEXT PRIMARY KEY NOT NULL,
    embedding   BLOB NOT NULL,
    updated_at  TEXT NOT NULL
);
";

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct SqliteSignatureStore {
    conn: Mutex<Connection>,
}

impl SqliteSignatureStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        tracing::info!(path = %path.display(), "using SQLite signature store");
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn encode(signature: &Signature) -> Vec<u8> {
    signature.values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(blob: &[u8]) -> Result<Signature, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!("signature blob of {} bytes", blob.len())));
    }
    Ok(Signature::new(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    ))
}

impl SignatureStore for SqliteSignatureStore {
    fn get_all(&self) -> Result<BTreeMap<IdentityKey, Signature>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare("SELECT roll_number, embedding FROM face_embeddings")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(backend)?;

        let mut map = BTreeMap::new();
        for row in rows {
            let (raw_key, blob) = row.map_err(backend)?;
            let Ok(key) = raw_key.parse::<IdentityKey>() else {
                tracing::warn!(key = %raw_key, "skipping invalid identity in store");
                continue;
            };
            map.insert(key, decode(&blob)?);
        }
        Ok(map)
    }

    fn upsert(&self, key: &IdentityKey, signature: &Signature) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO face_embeddings (roll_number, embedding, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(roll_number) DO UPDATE SET
                 embedding = excluded.embedding,
                 updated_at = excluded.updated_at",
            params![key.as_str(), encode(signature), chrono::Local::now().to_rfc3339()],
        )
        .map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> IdentityKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_database() {
        let store = SqliteSignatureStore::open_in_memory().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.db");
        let original = Signature::new((0..128).map(|i| (i as f32).sin() * 3.5).collect());

        SqliteSignatureStore::open(&path).unwrap().upsert(&key("21a1"), &original).unwrap();

        let loaded = SqliteSignatureStore::open(&path).unwrap().get_all().unwrap();
        assert_eq!(loaded[&key("21a1")], original);
    }

    #[test]
    fn test_upsert_replaces() {
        let store = SqliteSignatureStore::open_in_memory().unwrap();
        store.upsert(&key("a"), &Signature::new(vec![1.0, 2.0])).unwrap();
        store.upsert(&key("a"), &Signature::new(vec![5.0, 6.0])).unwrap();
        store.upsert(&key("b"), &Signature::new(vec![0.0, 0.0])).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&key("a")].values, vec![5.0, 6.0]);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        assert!(matches!(decode(&[0, 0, 128]), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_encode_decode() {
        let sig = Signature::new(vec![-1.5, 0.0, 1e-7, 42.25]);
        assert_eq!(decode(&encode(&sig)).unwrap(), sig);
    }
}
