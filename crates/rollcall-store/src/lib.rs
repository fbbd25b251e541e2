//! rollcall-store — Persistence backends for rollcall.
//!
//! Two interchangeable [`SignatureStore`] backends (flat JSON file and
//! SQLite) and the CSV attendance log.

pub mod attendance;
pub mod file;
pub mod sqlite;

pub use attendance::CsvAttendanceLog;
pub use file::FileSignatureStore;
pub use sqlite::SqliteSignatureStore;

use rollcall_core::store::{SignatureStore, StoreError};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Which signature backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    Sqlite,
}

impl StoreBackend {
    /// Default file name for this backend inside the data directory.
    pub fn default_file_name(&self) -> &'static str {
        match self {
            StoreBackend::File => "embeddings.json",
            StoreBackend::Sqlite => "faces.db",
        }
    }

    pub fn open(&self, path: &Path) -> Result<Arc<dyn SignatureStore>, StoreError> {
        Ok(match self {
            StoreBackend::File => Arc::new(FileSignatureStore::open(path)?),
            StoreBackend::Sqlite => Arc::new(SqliteSignatureStore::open(path)?),
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown store backend {0:?} (expected \"file\" or \"sqlite\")")]
pub struct UnknownBackend(pub String);

impl FromStr for StoreBackend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(StoreBackend::File),
            "sqlite" | "db" => Ok(StoreBackend::Sqlite),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}
