use crate::gallery::GallerySnapshot;
use crate::types::{IdentityKey, Signature};

/// Default Euclidean acceptance threshold in FaceNet signature space.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 8.0;

/// Result of matching a probe signature against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Matched identity, `None` when nothing is under threshold.
    pub identity: Option<IdentityKey>,
    /// Distance to the matched identity.
    pub distance: Option<f32>,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self { identity: None, distance: None }
    }

    pub fn matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a probe signature against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, probe: &Signature, gallery: &GallerySnapshot, threshold: f32) -> MatchResult;
}

/// Linear-scan Euclidean nearest neighbour.
///
/// A candidate is accepted when its distance is below `threshold` and
/// strictly below the best accepted so far. The gallery iterates in key
/// order, so an exact tie resolves to the lexicographically smallest key.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Signature, gallery: &GallerySnapshot, threshold: f32) -> MatchResult {
        let mut best = MatchResult::unknown();
        let mut best_distance = f32::INFINITY;

        for (key, reference) in gallery.iter() {
            if reference.dim() != probe.dim() {
                tracing::warn!(
                    identity = %key,
                    expected = probe.dim(),
                    got = reference.dim(),
                    "skipping gallery entry with mismatched signature dimension"
                );
                continue;
            }

            let distance = probe.euclidean_distance(reference);
            if distance < threshold && distance < best_distance {
                best_distance = distance;
                best = MatchResult {
                    identity: Some(key.clone()),
                    distance: Some(distance),
                };
            }
        }

        best
    }
}
