//! CSV attendance log: `Roll Number,Timestamp` header, one row per mark.

use rollcall_core::store::{AttendanceSink, StoreError};
use rollcall_core::AttendanceRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "Roll Number,Timestamp";

pub struct CsvAttendanceLog {
    path: PathBuf,
}

impl CsvAttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a field if it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl AttendanceSink for CsvAttendanceLog {
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut out = String::new();
        if file.metadata()?.len() == 0 {
            out.push_str(HEADER);
            out.push('\n');
        }
        out.push_str(&csv_field(record.identity.as_str()));
        out.push(',');
        out.push_str(&csv_field(&record.formatted_timestamp()));
        out.push('\n');

        file.write_all(out.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
