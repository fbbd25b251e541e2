//! Enrollment: build one averaged signature per identity from a batch of
//! images, persist it, and refresh the gallery.

use crate::detector::{DetectorError, FaceLocator};
use crate::gallery::Gallery;
use crate::image_ops;
use crate::policy::FacePolicy;
use crate::recognizer::{RecognizerError, SignatureExtractor, SIGNATURE_INPUT_SIZE};
use crate::store::{SignatureStore, StoreError};
use crate::types::{IdentityKey, IdentityKeyError, Signature};
use thiserror::Error;

/// Minimum number of images (submitted and usable) for one enrollment.
pub const DEFAULT_MIN_ENROLL_IMAGES: usize = 3;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("invalid roll number: {0}")]
    InvalidIdentity(#[from] IdentityKeyError),
    #[error("at least {required} images required, got {submitted}")]
    TooFewImages { submitted: usize, required: usize },
    #[error("only {usable} of the submitted images produced a face signature, need {required}")]
    InsufficientSignatures { usable: usize, required: usize },
    #[error("extracted signatures have inconsistent dimensions")]
    InconsistentSignatures,
    #[error("signature store: {0}")]
    Store(#[from] StoreError),
    /// The signature is in the store; recognition picks it up on the next
    /// successful gallery reload.
    #[error("signature for {identity} persisted, but gallery reload failed: {source}")]
    GalleryStale { identity: IdentityKey, source: StoreError },
}

/// Why a single enrollment image contributed nothing.
#[derive(Error, Debug)]
pub enum ImageRejection {
    #[error("could not decode image")]
    Undecodable,
    #[error("no face found")]
    NoFace,
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("signature extractor: {0}")]
    Extraction(#[from] RecognizerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrollReport {
    pub identity: IdentityKey,
    pub used_images: usize,
    pub skipped_images: usize,
}

/// Borrows the locator, extractor, store and gallery for one or more enrollments.
pub struct EnrollmentBuilder<'a> {
    locator: &'a mut dyn FaceLocator,
    extractor: &'a mut dyn SignatureExtractor,
    store: &'a dyn SignatureStore,
    gallery: &'a Gallery,
    face_policy: FacePolicy,
    min_images: usize,
}

impl<'a> EnrollmentBuilder<'a> {
    pub fn new(
        locator: &'a mut dyn FaceLocator,
        extractor: &'a mut dyn SignatureExtractor,
        store: &'a dyn SignatureStore,
        gallery: &'a Gallery,
    ) -> Self {
        Self {
            locator,
            extractor,
            store,
            gallery,
            face_policy: FacePolicy::Primary,
            min_images: DEFAULT_MIN_ENROLL_IMAGES,
        }
    }

    pub fn with_face_policy(mut self, face_policy: FacePolicy) -> Self {
        self.face_policy = face_policy;
        self
    }

    pub fn with_min_images(mut self, min_images: usize) -> Self {
        self.min_images = min_images;
        self
    }

    /// Enroll `raw_key` from `images`, replacing any previous signature.
    ///
    /// Images that fail to decode, contain no face or fail extraction are
    /// skipped. Nothing is written unless at least `min_images` signatures
    /// were extracted. On success the gallery has been reloaded.
    pub fn enroll(&mut self, raw_key: &str, images: &[Vec<u8>]) -> Result<EnrollReport, EnrollError> {
        let identity: IdentityKey = raw_key.parse()?;
        let required = self.min_images.max(1);

        if images.len() < self.min_images {
            return Err(EnrollError::TooFewImages {
                submitted: images.len(),
                required: self.min_images,
            });
        }

        let mut signatures = Vec::with_capacity(images.len());
        for (index, bytes) in images.iter().enumerate() {
            match self.extract(bytes) {
                Ok(signature) => signatures.push(signature),
                Err(reason) => {
                    tracing::warn!(identity = %identity, image = index, %reason, "skipping enrollment image");
                }
            }
        }

        if signatures.len() < required {
            tracing::warn!(
                identity = %identity,
                usable = signatures.len(),
                required,
                "enrollment rejected; gallery unchanged"
            );
            return Err(EnrollError::InsufficientSignatures {
                usable: signatures.len(),
                required,
            });
        }

        let mean = Signature::mean(&signatures).ok_or(EnrollError::InconsistentSignatures)?;

        if let Err(e) = self.store.upsert(&identity, &mean) {
            tracing::error!(identity = %identity, error = %e, "failed to persist signature");
            return Err(e.into());
        }
        if let Err(source) = self.gallery.reload() {
            tracing::error!(
                identity = %identity,
                error = %source,
                "signature persisted; gallery reload failed, call ReloadGallery to publish it"
            );
            return Err(EnrollError::GalleryStale { identity, source });
        }

        let report = EnrollReport {
            identity,
            used_images: signatures.len(),
            skipped_images: images.len() - signatures.len(),
        };
        tracing::info!(
            identity = %report.identity,
            used = report.used_images,
            skipped = report.skipped_images,
            "identity enrolled"
        );
        Ok(report)
    }

    /// decode → locate → crop → resize → embed for one image.
    fn extract(&mut self, bytes: &[u8]) -> Result<Signature, ImageRejection> {
        let image = image_ops::decode(bytes).ok_or(ImageRejection::Undecodable)?;
        let faces = self.locator.locate(&image)?;
        let face = self.face_policy.select(&faces).ok_or(ImageRejection::NoFace)?;
        let crop = image_ops::crop_face(&image, face).ok_or(ImageRejection::NoFace)?;
        let input = image_ops::resize_square(&crop, SIGNATURE_INPUT_SIZE);
        Ok(self.extractor.embed(&input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png, BrightFaceLocator, MeanColorExtractor, MemoryStore};
    use std::sync::Arc;

    fn key(s: &str) -> IdentityKey {
        s.parse().unwrap()
    }

    struct Fixture {
        locator: BrightFaceLocator,
        extractor: MeanColorExtractor,
        store: Arc<MemoryStore>,
        gallery: Gallery,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::default());
            let gallery = Gallery::load(store.clone());
            Self {
                locator: BrightFaceLocator::default(),
                extractor: MeanColorExtractor::default(),
                store,
                gallery,
            }
        }

        fn enroll(&mut self, raw_key: &str, images: &[Vec<u8>]) -> Result<EnrollReport, EnrollError> {
            EnrollmentBuilder::new(&mut self.locator, &mut self.extractor, self.store.as_ref(), &self.gallery)
                .enroll(raw_key, images)
        }
    }

    #[test]
    fn test_enroll_averages_and_reloads() {
        let mut fx = Fixture::new();
        let images = vec![png([198, 40, 40]), png([200, 40, 40]), png([202, 40, 40])];

        let report = fx.enroll(" 21A1 ", &images).unwrap();
        assert_eq!(report.identity, key("21a1"));
        assert_eq!(report.used_images, 3);
        assert_eq!(report.skipped_images, 0);

        let stored = fx.store.get(&key("21a1")).unwrap();
        assert!((stored.values[0] - 200.0).abs() < 1.0);
        assert!((stored.values[1] - 40.0).abs() < 1.0);

        let snapshot = fx.gallery.snapshot();
        assert_eq!(snapshot.get(&key("21a1")), Some(&stored));
    }

    #[test]
    fn test_enroll_skips_bad_images() {
        let mut fx = Fixture::new();
        let images = vec![
            png([100, 100, 100]),
            b"garbage".to_vec(),
            png([0, 0, 0]), // no face
            png([100, 100, 100]),
            png([100, 100, 100]),
        ];
        let report = fx.enroll("x1", &images).unwrap();
        assert_eq!(report.used_images, 3);
        assert_eq!(report.skipped_images, 2);
    }

    #[test]
    fn test_enroll_too_few_submitted() {
        let mut fx = Fixture::new();
        let err = fx.enroll("x1", &[png([100, 100, 100]), png([100, 100, 100])]).unwrap_err();
        assert!(matches!(err, EnrollError::TooFewImages { submitted: 2, required: 3 }));
        assert_eq!(fx.store.upsert_count(), 0);
    }

    #[test]
    fn test_enroll_too_few_usable_keeps_prior_entry() {
        let mut fx = Fixture::new();
        let prior = Signature::new(vec![1.0, 2.0, 3.0]);
        fx.store.insert(key("21a1"), prior.clone());
        fx.gallery.reload().unwrap();

        let images = vec![png([100, 100, 100]), png([100, 100, 100]), png([0, 0, 0])];
        let err = fx.enroll("21a1", &images).unwrap_err();
        assert!(matches!(err, EnrollError::InsufficientSignatures { usable: 2, required: 3 }));

        assert_eq!(fx.store.get(&key("21a1")), Some(prior.clone()));
        assert_eq!(fx.gallery.snapshot().get(&key("21a1")), Some(&prior));
        assert_eq!(fx.store.upsert_count(), 0);
    }

    #[test]
    fn test_enroll_extractor_failure_is_soft() {
        let mut fx = Fixture::new();
        fx.extractor.failing = true;
        let images = vec![png([100, 100, 100]); 3];
        let err = fx.enroll("x1", &images).unwrap_err();
        assert!(matches!(err, EnrollError::InsufficientSignatures { usable: 0, .. }));
    }

    #[test]
    fn test_enroll_rejects_blank_key() {
        let mut fx = Fixture::new();
        let err = fx.enroll("   ", &vec![png([100, 100, 100]); 3]).unwrap_err();
        assert!(matches!(err, EnrollError::InvalidIdentity(IdentityKeyError::Empty)));
    }

    #[test]
    fn test_reenroll_overwrites() {
        let mut fx = Fixture::new();
        fx.enroll("21a1", &vec![png([200, 40, 40]); 3]).unwrap();
        fx.enroll("21a1", &vec![png([40, 200, 40]); 3]).unwrap();

        let stored = fx.store.get(&key("21a1")).unwrap();
        assert!((stored.values[0] - 40.0).abs() < 1.0);
        assert!((stored.values[1] - 200.0).abs() < 1.0);
        assert_eq!(fx.gallery.snapshot().len(), 1);
    }

    #[test]
    fn test_store_failure_leaves_gallery_untouched() {
        let mut fx = Fixture::new();
        fx.store.set_failing(true);
        let err = fx.enroll("x1", &vec![png([100, 100, 100]); 3]).unwrap_err();
        assert!(matches!(err, EnrollError::Store(_)));
        assert!(fx.gallery.snapshot().is_empty());
    }

    #[test]
    fn test_reload_failure_after_persist_is_reported_separately() {
        let mut fx = Fixture::new();
        fx.store.set_failing_reads(true);

        let err = fx.enroll("21a1", &vec![png([200, 40, 40]); 3]).unwrap_err();
        assert!(matches!(&err, EnrollError::GalleryStale { identity, .. } if identity.as_str() == "21a1"));
        assert!(fx.store.get(&key("21a1")).is_some());
        assert!(fx.gallery.snapshot().is_empty());

        fx.store.set_failing_reads(false);
        fx.gallery.reload().unwrap();
        assert!(fx.gallery.snapshot().contains(&key("21a1")));
    }

    #[test]
    fn test_custom_min_images() {
        let mut fx = Fixture::new();
        let report = EnrollmentBuilder::new(&mut fx.locator, &mut fx.extractor, fx.store.as_ref(), &fx.gallery)
            .with_min_images(1)
            .enroll("solo", &[png([90, 90, 90])])
            .unwrap();
        assert_eq!(report.used_images, 1);
    }
}
