//! The recognition pipeline: one frame in, one attendance outcome out.
//!
//! Stages run strictly in order and each may end the frame early:
//! decode → locate → spoof check → extract → match → record.

use crate::detector::FaceLocator;
use crate::enroll::{EnrollError, EnrollReport, EnrollmentBuilder, DEFAULT_MIN_ENROLL_IMAGES};
use crate::gallery::Gallery;
use crate::image_ops;
use crate::import::{self, ImportError, ImportReport};
use crate::liveness::{LivenessClassifier, LIVENESS_INPUT_SIZE};
use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::policy::{DedupPolicy, FacePolicy};
use crate::recognizer::{SignatureExtractor, SIGNATURE_INPUT_SIZE};
use crate::store::{AttendanceSink, SignatureStore};
use crate::types::{AttendanceRecord, IdentityKey};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// The three pretrained models, loaded once and owned by whoever runs the pipeline.
pub struct FaceModels {
    pub locator: Box<dyn FaceLocator + Send>,
    pub liveness: Box<dyn LivenessClassifier + Send>,
    pub extractor: Box<dyn SignatureExtractor + Send>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Euclidean distance a match must stay strictly below.
    pub match_threshold: f32,
    /// Minimum images submitted, and signatures extracted, per enrollment.
    pub min_enroll_images: usize,
    pub face_policy: FacePolicy,
    pub dedup: DedupPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            min_enroll_images: DEFAULT_MIN_ENROLL_IMAGES,
            face_policy: FacePolicy::Primary,
            dedup: DedupPolicy::None,
        }
    }
}

/// Terminal result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    InvalidImage,
    NoFaceFound,
    SpoofDetected,
    UnknownFace,
    AttendanceMarked(IdentityKey),
    /// Matched, but suppressed by a [`DedupPolicy::Window`].
    AlreadyMarked(IdentityKey),
    /// Recoverable internal failure (log write error, timeout).
    ProcessingFailed,
}

impl FrameOutcome {
    /// User-facing status string.
    pub fn status(&self) -> &'static str {
        match self {
            FrameOutcome::InvalidImage => "Invalid image",
            FrameOutcome::NoFaceFound => "No face found",
            FrameOutcome::SpoofDetected => "Spoof attempt detected",
            FrameOutcome::UnknownFace => "Unknown face",
            FrameOutcome::AttendanceMarked(_) => "Attendance marked",
            FrameOutcome::AlreadyMarked(_) => "Attendance already marked",
            FrameOutcome::ProcessingFailed => "Processing failed",
        }
    }

    pub fn identity(&self) -> Option<&IdentityKey> {
        match self {
            FrameOutcome::AttendanceMarked(key) | FrameOutcome::AlreadyMarked(key) => Some(key),
            _ => None,
        }
    }

    /// `{"status": ...}`, plus `"rollNumber"` when an identity was matched.
    pub fn to_json(&self) -> serde_json::Value {
        match self.identity() {
            Some(key) => serde_json::json!({ "status": self.status(), "rollNumber": key.as_str() }),
            None => serde_json::json!({ "status": self.status() }),
        }
    }
}

pub struct RecognitionPipeline {
    models: FaceModels,
    store: Arc<dyn SignatureStore>,
    gallery: Arc<Gallery>,
    attendance: Box<dyn AttendanceSink>,
    config: PipelineConfig,
    last_marked: HashMap<IdentityKey, Instant>,
}

impl RecognitionPipeline {
    pub fn new(
        models: FaceModels,
        store: Arc<dyn SignatureStore>,
        gallery: Arc<Gallery>,
        attendance: Box<dyn AttendanceSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            models,
            store,
            gallery,
            attendance,
            config,
            last_marked: HashMap::new(),
        }
    }

    pub fn gallery(&self) -> &Arc<Gallery> {
        &self.gallery
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one frame through every stage. Never panics on bad input; every
    /// failure becomes a [`FrameOutcome`].
    pub fn process_frame(&mut self, bytes: &[u8]) -> FrameOutcome {
        let Some(image) = image_ops::decode(bytes) else {
            return FrameOutcome::InvalidImage;
        };

        let faces = match self.models.locator.locate(&image) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(error = %e, "face locator failed; treating frame as faceless");
                Vec::new()
            }
        };
        let Some(face) = self.config.face_policy.select(&faces) else {
            return FrameOutcome::NoFaceFound;
        };
        tracing::debug!(detections = faces.len(), confidence = face.confidence, "face selected");

        let Some(crop) = image_ops::crop_face(&image, face) else {
            tracing::debug!(?face, "selected face lies outside the image");
            return FrameOutcome::NoFaceFound;
        };

        let verdict = self
            .models
            .liveness
            .classify(&image_ops::resize_square(&crop, LIVENESS_INPUT_SIZE));
        if verdict.is_spoof {
            tracing::info!(confidence = verdict.confidence, "spoof attempt rejected");
            return FrameOutcome::SpoofDetected;
        }

        let signature = match self
            .models
            .extractor
            .embed(&image_ops::resize_square(&crop, SIGNATURE_INPUT_SIZE))
        {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(error = %e, "signature extraction failed");
                return FrameOutcome::UnknownFace;
            }
        };

        let gallery = self.gallery.snapshot();
        let result = EuclideanMatcher.compare(&signature, &gallery, self.config.match_threshold);
        let Some(identity) = result.identity else {
            tracing::debug!(gallery = gallery.len(), "no gallery match");
            return FrameOutcome::UnknownFace;
        };
        tracing::debug!(identity = %identity, distance = ?result.distance, "gallery match");

        self.record(identity)
    }

    fn record(&mut self, identity: IdentityKey) -> FrameOutcome {
        if let DedupPolicy::Window(window) = self.config.dedup {
            self.last_marked.retain(|_, marked| marked.elapsed() < window);
            if let Some(last) = self.last_marked.get(&identity) {
                if last.elapsed() < window {
                    tracing::debug!(identity = %identity, "attendance already marked within window");
                    return FrameOutcome::AlreadyMarked(identity);
                }
            }
        }

        let record = AttendanceRecord::now(identity);
        if let Err(e) = self.attendance.append(&record) {
            tracing::error!(identity = %record.identity, error = %e, "failed to write attendance record");
            return FrameOutcome::ProcessingFailed;
        }

        if matches!(self.config.dedup, DedupPolicy::Window(_)) {
            self.last_marked.insert(record.identity.clone(), Instant::now());
        }
        tracing::info!(identity = %record.identity, "attendance marked");
        FrameOutcome::AttendanceMarked(record.identity)
    }

    fn enrollment(&mut self) -> EnrollmentBuilder<'_> {
        EnrollmentBuilder::new(
            self.models.locator.as_mut(),
            self.models.extractor.as_mut(),
            self.store.as_ref(),
            &self.gallery,
        )
        .with_face_policy(self.config.face_policy)
        .with_min_images(self.config.min_enroll_images)
    }

    /// Enroll one identity; see [`EnrollmentBuilder::enroll`].
    pub fn enroll(&mut self, raw_key: &str, images: &[Vec<u8>]) -> Result<EnrollReport, EnrollError> {
        self.enrollment().enroll(raw_key, images)
    }

    /// Enroll every identity folder under `dir`; see [`import::import_dataset`].
    pub fn import_dataset(&mut self, dir: &Path) -> Result<ImportReport, ImportError> {
        import::import_dataset(&mut self.enrollment(), dir)
    }
}
