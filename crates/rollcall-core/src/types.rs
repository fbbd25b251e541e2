use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bounding box for a detected face, in source image pixel coordinates.
///
/// Coordinates come straight from the detector and may lie outside the
/// image at the edges; clamp with [`crate::image_ops::clamp_to_image`]
/// before cropping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityKeyError {
    #[error("identity key is empty")]
    Empty,
}

/// Normalized roll number: trimmed and lowercased.
///
/// The sole join key between enrollment, the gallery and the attendance log.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for IdentityKey {
    type Err = IdentityKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(IdentityKeyError::Empty);
        }
        Ok(Self(normalized))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Face identity signature (128-dimensional for FaceNet).
///
/// Signatures are NOT normalized. They are compared by raw Euclidean
/// distance, so their scale is part of the match threshold's meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature {
    pub values: Vec<f32>,
}

impl Signature {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two signatures.
    pub fn euclidean_distance(&self, other: &Signature) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise arithmetic mean.
    ///
    /// Returns `None` for an empty slice or when dimensions disagree.
    pub fn mean(signatures: &[Signature]) -> Option<Signature> {
        let first = signatures.first()?;
        let dim = first.dim();
        if signatures.iter().any(|s| s.dim() != dim) {
            return None;
        }

        let mut sum = vec![0.0f64; dim];
        for signature in signatures {
            for (acc, v) in sum.iter_mut().zip(&signature.values) {
                *acc += f64::from(*v);
            }
        }
        let n = signatures.len() as f64;
        Some(Signature::new(sum.into_iter().map(|v| (v / n) as f32).collect()))
    }
}

/// Output of the liveness classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LivenessVerdict {
    pub is_spoof: bool,
    /// Probability of the winning class, in [0, 1].
    pub confidence: f32,
}

impl LivenessVerdict {
    /// The verdict used whenever classification cannot complete.
    pub const FAIL_CLOSED: LivenessVerdict = LivenessVerdict {
        is_spoof: true,
        confidence: 0.0,
    };
}

/// One row of the attendance log.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub identity: IdentityKey,
    pub timestamp: DateTime<Local>,
}

impl AttendanceRecord {
    pub fn now(identity: IdentityKey) -> Self {
        Self {
            identity,
            timestamp: Local::now(),
        }
    }

    /// Timestamp in the log's `YYYY-MM-DD HH:MM:SS` local-time format.
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_normalizes() {
        let key: IdentityKey = "  21A1 \n".parse().unwrap();
        assert_eq!(key.as_str(), "21a1");
    }

    #[test]
    fn test_identity_key_rejects_blank() {
        assert_eq!("   ".parse::<IdentityKey>(), Err(IdentityKeyError::Empty));
        assert_eq!("".parse::<IdentityKey>(), Err(IdentityKeyError::Empty));
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Signature::new(vec![0.0, 0.0]);
        let b = Signature::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_scale_matters() {
        // Same direction, different magnitude: cosine would call these identical.
        let a = Signature::new(vec![1.0, 1.0]);
        let b = Signature::new(vec![10.0, 10.0]);
        assert!(a.euclidean_distance(&b) > 12.0);
    }

    #[test]
    fn test_mean() {
        let mean = Signature::mean(&[
            Signature::new(vec![1.0, 2.0, 3.0]),
            Signature::new(vec![3.0, 4.0, 5.0]),
        ])
        .unwrap();
        assert_eq!(mean.values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean_empty() {
        assert!(Signature::mean(&[]).is_none());
    }

    #[test]
    fn test_mean_dimension_mismatch() {
        let result = Signature::mean(&[Signature::new(vec![1.0]), Signature::new(vec![1.0, 2.0])]);
        assert!(result.is_none());
    }

    #[test]
    fn test_fail_closed_verdict() {
        assert!(LivenessVerdict::FAIL_CLOSED.is_spoof);
        assert_eq!(LivenessVerdict::FAIL_CLOSED.confidence, 0.0);
    }

    #[test]
    fn test_bounding_box_area_ignores_negative_extent() {
        let b = BoundingBox { x: 0.0, y: 0.0, width: -4.0, height: 10.0, confidence: 1.0 };
        assert_eq!(b.area(), 0.0);
    }
}
