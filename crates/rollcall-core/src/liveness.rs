//! Presentation-attack (spoof) detection via a MiniFASNet ONNX model.
//!
//! The classifier fails closed: any internal error is reported as a spoof
//! with zero confidence, never as a live face.

use crate::types::LivenessVerdict;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Side length of the square crop the classifier consumes.
pub const LIVENESS_INPUT_SIZE: u32 = 80;
/// Output class index meaning "real face"; every other class is a spoof.
const MINIFASNET_REAL_CLASS: usize = 1;
const MINIFASNET_NUM_CLASSES: usize = 3;

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("expected {expected}x{expected} input, got {width}x{height}")]
    InputSize { expected: u32, width: u32, height: u32 },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Decides whether a cropped face is a live presentation.
///
/// Implementors provide [`try_classify`](Self::try_classify); callers use
/// [`classify`](Self::classify), which turns every error into
/// [`LivenessVerdict::FAIL_CLOSED`].
pub trait LivenessClassifier {
    /// Classify an `80×80` RGB face crop.
    fn try_classify(&mut self, face: &RgbImage) -> Result<LivenessVerdict, LivenessError>;

    fn classify(&mut self, face: &RgbImage) -> LivenessVerdict {
        match self.try_classify(face) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "liveness classifier failed; treating face as spoof");
                LivenessVerdict::FAIL_CLOSED
            }
        }
    }
}

/// MiniFASNet anti-spoofing classifier.
pub struct SpoofClassifier {
    session: Session,
}

impl SpoofClassifier {
    /// Load the MiniFASNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LivenessError> {
        if !Path::new(model_path).exists() {
            return Err(LivenessError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded MiniFASNet model"
        );

        Ok(Self { session })
    }

    /// Convert an RGB crop into the BGR, unnormalized NCHW tensor MiniFASNet was trained on.
    fn preprocess(face: &RgbImage) -> Result<Array4<f32>, LivenessError> {
        if face.width() != LIVENESS_INPUT_SIZE || face.height() != LIVENESS_INPUT_SIZE {
            return Err(LivenessError::InputSize {
                expected: LIVENESS_INPUT_SIZE,
                width: face.width(),
                height: face.height(),
            });
        }

        let size = LIVENESS_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in face.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[2] as f32;
            tensor[[0, 1, y, x]] = pixel[1] as f32;
            tensor[[0, 2, y, x]] = pixel[0] as f32;
        }
        Ok(tensor)
    }
}

impl LivenessClassifier for SpoofClassifier {
    fn try_classify(&mut self, face: &RgbImage) -> Result<LivenessVerdict, LivenessError> {
        let input = Self::preprocess(face)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LivenessError::InferenceFailed(format!("logits: {e}")))?;

        verdict_from_logits(logits)
    }
}

/// Softmax the class logits and read off the winning class.
fn verdict_from_logits(logits: &[f32]) -> Result<LivenessVerdict, LivenessError> {
    if logits.len() != MINIFASNET_NUM_CLASSES || logits.iter().any(|v| !v.is_finite()) {
        return Err(LivenessError::InferenceFailed(format!(
            "expected {MINIFASNET_NUM_CLASSES} finite logits, got {logits:?}"
        )));
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();

    let (label, best) = exps
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });

    Ok(LivenessVerdict {
        is_spoof: label != MINIFASNET_REAL_CLASS,
        confidence: (best / total).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct Broken;

    impl LivenessClassifier for Broken {
        fn try_classify(&mut self, _face: &RgbImage) -> Result<LivenessVerdict, LivenessError> {
            Err(LivenessError::InferenceFailed("boom".into()))
        }
    }

    #[test]
    fn test_classify_fails_closed() {
        let face = RgbImage::new(LIVENESS_INPUT_SIZE, LIVENESS_INPUT_SIZE);
        assert_eq!(Broken.classify(&face), LivenessVerdict::FAIL_CLOSED);
    }

    #[test]
    fn test_verdict_real() {
        let verdict = verdict_from_logits(&[0.1, 4.0, 0.2]).unwrap();
        assert!(!verdict.is_spoof);
        assert!(verdict.confidence > 0.9 && verdict.confidence <= 1.0);
    }

    #[test]
    fn test_verdict_spoof() {
        let verdict = verdict_from_logits(&[3.0, 0.5, 0.1]).unwrap();
        assert!(verdict.is_spoof);
        let verdict = verdict_from_logits(&[0.0, 0.5, 2.5]).unwrap();
        assert!(verdict.is_spoof);
    }

    #[test]
    fn test_verdict_malformed_output() {
        assert!(verdict_from_logits(&[1.0, 2.0]).is_err());
        assert!(verdict_from_logits(&[1.0, f32::NAN, 0.0]).is_err());
    }

    #[test]
    fn test_preprocess_bgr_order() {
        let face = RgbImage::from_pixel(LIVENESS_INPUT_SIZE, LIVENESS_INPUT_SIZE, Rgb([10, 20, 30]));
        let tensor = SpoofClassifier::preprocess(&face).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 80, 80]);
        assert_eq!(tensor[[0, 0, 5, 5]], 30.0);
        assert_eq!(tensor[[0, 1, 5, 5]], 20.0);
        assert_eq!(tensor[[0, 2, 5, 5]], 10.0);
    }

    #[test]
    fn test_preprocess_rejects_wrong_size() {
        let face = RgbImage::new(64, 80);
        assert!(matches!(
            SpoofClassifier::preprocess(&face),
            Err(LivenessError::InputSize { width: 64, height: 80, .. })
        ));
    }
}
