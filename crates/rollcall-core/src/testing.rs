//! In-memory stand-ins for the model, store and log seams.

use crate::detector::{DetectorError, FaceLocator};
use crate::liveness::{LivenessClassifier, LivenessError};
use crate::pipeline::FaceModels;
use crate::recognizer::{RecognizerError, SignatureExtractor, SIGNATURE_INPUT_SIZE};
use crate::store::{AttendanceSink, SignatureStore, StoreError};
use crate::types::{AttendanceRecord, BoundingBox, IdentityKey, LivenessVerdict, Signature};
use image::{Rgb, RgbImage};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Encode a solid-colour 64×48 PNG.
pub(crate) fn png(color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 48, Rgb(color));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Finds one face covering (and overhanging) any image that is not nearly black.
#[derive(Default)]
pub(crate) struct BrightFaceLocator {
    pub(crate) failing: bool,
}

impl FaceLocator for BrightFaceLocator {
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if self.failing {
            return Err(DetectorError::InferenceFailed("locator offline".into()));
        }
        let brightest = image.pixels().flat_map(|p| p.0).max().unwrap_or(0);
        if brightest < 16 {
            return Ok(Vec::new());
        }
        Ok(vec![BoundingBox {
            x: -4.0,
            y: -4.0,
            width: image.width() as f32 + 8.0,
            height: image.height() as f32 + 8.0,
            confidence: 0.99,
        }])
    }
}

/// Returns a fixed verdict, or an error when `verdict` is `None`.
pub(crate) struct FixedLiveness {
    pub(crate) verdict: Option<LivenessVerdict>,
}

impl FixedLiveness {
    pub(crate) fn live() -> Self {
        Self {
            verdict: Some(LivenessVerdict { is_spoof: false, confidence: 0.97 }),
        }
    }
}

impl LivenessClassifier for FixedLiveness {
    fn try_classify(&mut self, face: &RgbImage) -> Result<LivenessVerdict, LivenessError> {
        assert_eq!(face.dimensions(), (80, 80), "liveness input must be resized by the caller");
        self.verdict
            .ok_or_else(|| LivenessError::InferenceFailed("classifier crashed".into()))
    }
}

/// Signature = mean R, G, B of the crop. Distinct colours act as distinct people.
#[derive(Default)]
pub(crate) struct MeanColorExtractor {
    pub(crate) failing: bool,
}

impl SignatureExtractor for MeanColorExtractor {
    fn embed(&mut self, face: &RgbImage) -> Result<Signature, RecognizerError> {
        if self.failing {
            return Err(RecognizerError::InferenceFailed("extractor crashed".into()));
        }
        if face.dimensions() != (SIGNATURE_INPUT_SIZE, SIGNATURE_INPUT_SIZE) {
            return Err(RecognizerError::InputSize {
                expected: SIGNATURE_INPUT_SIZE,
                width: face.width(),
                height: face.height(),
            });
        }
        let n = (face.width() * face.height()) as f32;
        let mut sum = [0.0f32; 3];
        for pixel in face.pixels() {
            for c in 0..3 {
                sum[c] += pixel[c] as f32;
            }
        }
        Ok(Signature::new(sum.iter().map(|s| s / n).collect()))
    }
}

pub(crate) fn fake_models() -> FaceModels {
    FaceModels {
        locator: Box::new(BrightFaceLocator::default()),
        liveness: Box::new(FixedLiveness::live()),
        extractor: Box::new(MeanColorExtractor::default()),
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<BTreeMap<IdentityKey, Signature>>,
    failing: AtomicBool,
    failing_reads: AtomicBool,
    upserts: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn insert(&self, key: IdentityKey, signature: Signature) {
        self.entries.lock().unwrap().insert(key, signature);
    }

    pub(crate) fn get(&self, key: &IdentityKey) -> Option<Signature> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail `get_all` only; writes still succeed.
    pub(crate) fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".into()));
        }
        Ok(())
    }
}

impl SignatureStore for MemoryStore {
    fn get_all(&self) -> Result<BTreeMap<IdentityKey, Signature>, StoreError> {
        self.check()?;
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store unreadable".into()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    fn upsert(&self, key: &IdentityKey, signature: &Signature) -> Result<(), StoreError> {
        self.check()?;
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.insert(key.clone(), signature.clone());
        Ok(())
    }
}

/// Records into a shared vector the test keeps a handle to.
#[derive(Clone, Default)]
pub(crate) struct MemorySink {
    pub(crate) records: Arc<Mutex<Vec<AttendanceRecord>>>,
    pub(crate) failing: bool,
}

impl MemorySink {
    pub(crate) fn identities(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identity.to_string())
            .collect()
    }
}

impl AttendanceSink for MemorySink {
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
