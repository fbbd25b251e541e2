use rollcall_core::{DedupPolicy, FacePolicy, PipelineConfig};
use rollcall_store::StoreBackend;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Signature store backend.
    pub store_backend: StoreBackend,
    /// Signature store file (JSON file or SQLite database).
    pub store_path: PathBuf,
    /// CSV attendance log.
    pub attendance_path: PathBuf,
    /// Euclidean distance a match must stay below.
    pub match_threshold: f32,
    /// Images required per enrollment.
    pub min_enroll_images: usize,
    /// Which detection to use when a frame has several faces.
    pub face_policy: FacePolicy,
    /// Suppress repeat marks for one identity within this many seconds (0 = never).
    pub dedup_window_secs: u64,
    /// Upper bound on a single engine request.
    pub request_timeout_secs: u64,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = rollcall_core::data_dir();

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let store_backend = match std::env::var("ROLLCALL_STORE_BACKEND") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to file store backend");
                StoreBackend::File
            }),
            Err(_) => StoreBackend::File,
        };

        let store_path = std::env::var("ROLLCALL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(store_backend.default_file_name()));

        let attendance_path = std::env::var("ROLLCALL_ATTENDANCE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.csv"));

        let face_policy = match std::env::var("ROLLCALL_FACE_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to primary face policy");
                FacePolicy::Primary
            }),
            Err(_) => FacePolicy::default(),
        };

        Self {
            model_dir,
            store_backend,
            store_path,
            attendance_path,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", rollcall_core::matcher::DEFAULT_MATCH_THRESHOLD),
            min_enroll_images: env_usize(
                "ROLLCALL_MIN_ENROLL_IMAGES",
                rollcall_core::enroll::DEFAULT_MIN_ENROLL_IMAGES,
            ),
            face_policy,
            dedup_window_secs: env_u64("ROLLCALL_DEDUP_WINDOW_SECS", 0),
            request_timeout_secs: env_u64("ROLLCALL_REQUEST_TIMEOUT_SECS", 30),
            session_bus: std::env::var("ROLLCALL_SESSION_BUS")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_path("det_10g.onnx")
    }

    /// Path to the MiniFASNet anti-spoofing model.
    pub fn liveness_model_path(&self) -> String {
        self.model_path("minifasnet_v1se.onnx")
    }

    /// Path to the FaceNet signature model.
    pub fn facenet_model_path(&self) -> String {
        self.model_path("facenet128.onnx")
    }

    fn model_path(&self, file: &str) -> String {
        self.model_dir.join(file).to_string_lossy().into_owned()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            match_threshold: self.match_threshold,
            min_enroll_images: self.min_enroll_images,
            face_policy: self.face_policy,
            dedup: DedupPolicy::from_secs(self.dedup_window_secs),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
