//! FaceNet signature extractor via ONNX Runtime.
//!
//! Produces 128-dimensional signatures from face crops that have already
//! been isolated by the locator. No detection happens here.

use crate::types::Signature;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Side length of the square crop the extractor consumes.
pub const SIGNATURE_INPUT_SIZE: u32 = 160;
const FACENET_SIGNATURE_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("expected {expected}x{expected} input, got {width}x{height}")]
    InputSize { expected: u32, width: u32, height: u32 },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns a `160×160` RGB face crop into an identity signature.
pub trait SignatureExtractor {
    fn embed(&mut self, face: &RgbImage) -> Result<Signature, RecognizerError>;
}

/// FaceNet-based signature extractor.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Preprocess a 160×160 RGB crop into an NHWC tensor scaled to [0, 1].
    fn preprocess(face: &RgbImage) -> Result<Array4<f32>, RecognizerError> {
        if face.width() != SIGNATURE_INPUT_SIZE || face.height() != SIGNATURE_INPUT_SIZE {
            return Err(RecognizerError::InputSize {
                expected: SIGNATURE_INPUT_SIZE,
                width: face.width(),
                height: face.height(),
            });
        }

        let size = SIGNATURE_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in face.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
            }
        }
        Ok(tensor)
    }
}

impl SignatureExtractor for FaceRecognizer {
    fn embed(&mut self, face: &RgbImage) -> Result<Signature, RecognizerError> {
        let input = Self::preprocess(face)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("signature extraction: {e}")))?;

        if raw.len() != FACENET_SIGNATURE_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {FACENET_SIGNATURE_DIM}-dim signature, got {}",
                raw.len()
            )));
        }
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(RecognizerError::InferenceFailed("non-finite signature value".into()));
        }

        // Raw scale is kept: matching is by Euclidean distance on unnormalized vectors.
        Ok(Signature::new(raw.to_vec()))
    }
}
