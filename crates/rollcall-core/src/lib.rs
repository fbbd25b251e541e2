//! rollcall-core — Face recognition pipeline for attendance marking.
//!
//! Uses SCRFD for face location, MiniFASNet for spoof rejection and FaceNet
//! for identity signatures, all running via ONNX Runtime on CPU. Signatures
//! are matched against an in-memory gallery by Euclidean distance.

pub mod detector;
pub mod enroll;
pub mod gallery;
pub mod image_ops;
pub mod import;
pub mod liveness;
pub mod matcher;
pub mod pipeline;
pub mod policy;
pub mod recognizer;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use detector::{FaceDetector, FaceLocator};
pub use enroll::{EnrollError, EnrollReport, EnrollmentBuilder};
pub use gallery::{Gallery, GallerySnapshot};
pub use import::{ImportError, ImportReport};
pub use liveness::{LivenessClassifier, SpoofClassifier};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use pipeline::{FaceModels, FrameOutcome, PipelineConfig, RecognitionPipeline};
pub use policy::{DedupPolicy, FacePolicy};
pub use recognizer::{FaceRecognizer, SignatureExtractor};
pub use store::{AttendanceSink, SignatureStore, StoreError};
pub use types::{AttendanceRecord, BoundingBox, IdentityKey, LivenessVerdict, Signature};

/// Default model directory: `$XDG_DATA_HOME/rollcall/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    data_dir().join("models")
}

/// Base data directory: `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn data_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}
