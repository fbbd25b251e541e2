use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use rollcall_core::EnrollError;
use std::path::PathBuf;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    store_backend: String,
    match_threshold: f32,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, config: &Config) -> Self {
        Self {
            engine,
            store_backend: format!("{:?}", config.store_backend).to_lowercase(),
            match_threshold: config.match_threshold,
        }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Recognize one encoded frame and mark attendance.
    ///
    /// Returns `{"status": ..., "rollNumber": ...}` as JSON.
    async fn process_frame(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::debug!(bytes = image.len(), "process_frame requested");
        let outcome = self.engine.process_frame(image).await;
        Ok(outcome.to_json().to_string())
    }

    /// Enroll a roll number from a batch of encoded face images.
    ///
    /// Returns false when enrollment was rejected; the reason is logged.
    async fn enroll(&self, roll_number: &str, images: Vec<Vec<u8>>) -> zbus::fdo::Result<bool> {
        tracing::info!(roll_number, images = images.len(), "enroll requested");
        match self.engine.enroll(roll_number.to_string(), images).await {
            Ok(report) => {
                tracing::info!(
                    identity = %report.identity,
                    used = report.used_images,
                    skipped = report.skipped_images,
                    "enrollment complete"
                );
                Ok(true)
            }
            Err(EngineError::Enroll(EnrollError::Store(e))) => {
                tracing::error!(roll_number, error = %e, "enrollment could not be persisted");
                Ok(false)
            }
            Err(EngineError::Enroll(EnrollError::GalleryStale { identity, source })) => {
                tracing::error!(
                    identity = %identity,
                    error = %source,
                    "signature persisted but not yet recognizable; call ReloadGallery"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(roll_number, error = %e, "enrollment rejected");
                Ok(false)
            }
        }
    }

    /// Enroll every identity folder found under `dir` on the daemon's host.
    ///
    /// Returns the import report as JSON.
    async fn import_dataset(&self, dir: &str) -> zbus::fdo::Result<String> {
        tracing::info!(dir, "import_dataset requested");
        let report = self.engine.import_dataset(PathBuf::from(dir)).await.map_err(|e| {
            tracing::warn!(dir, error = %e, "dataset import failed");
            zbus::fdo::Error::Failed("dataset import failed".into())
        })?;
        serde_json::to_string(&report).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// JSON array of enrolled roll numbers, sorted.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let snapshot = self.engine.gallery().snapshot();
        let keys: Vec<&str> = snapshot.keys().map(|k| k.as_str()).collect();
        Ok(serde_json::json!(keys).to_string())
    }

    /// Rebuild the gallery from the store; returns the new entry count.
    async fn reload_gallery(&self) -> zbus::fdo::Result<u32> {
        let gallery = self.engine.gallery().clone();
        let reloaded = tokio::task::spawn_blocking(move || gallery.reload())
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        match reloaded {
            Ok(count) => Ok(count as u32),
            Err(e) => {
                tracing::warn!(error = %e, "gallery reload failed, keeping previous snapshot");
                Err(zbus::fdo::Error::Failed("gallery reload failed".into()))
            }
        }
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "store_backend": self.store_backend,
            "gallery_size": self.engine.gallery().snapshot().len(),
            "match_threshold": self.match_threshold,
        })
        .to_string())
    }
}
