//! Persistence seams: the signature store behind the gallery and the
//! attendance log the pipeline records into.

use crate::types::{AttendanceRecord, IdentityKey, Signature};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store data: {0}")]
    Corrupt(String),
    #[error("backend: {0}")]
    Backend(String),
}

/// Read/write contract shared by every signature backend.
///
/// `upsert` replaces any existing signature for the key; backends never
/// merge old and new vectors.
pub trait SignatureStore: Send + Sync {
    /// Load every enrolled signature. A missing or empty store is an empty map.
    fn get_all(&self) -> Result<BTreeMap<IdentityKey, Signature>, StoreError>;

    fn upsert(&self, key: &IdentityKey, signature: &Signature) -> Result<(), StoreError>;
}

/// Append-only attendance record sink.
pub trait AttendanceSink: Send {
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), StoreError>;
}
