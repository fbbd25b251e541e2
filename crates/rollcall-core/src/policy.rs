use crate::types::BoundingBox;
use std::str::FromStr;
use std::time::Duration;

/// Which detection a multi-face frame is processed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacePolicy {
    /// The detector's highest-priority (first) result.
    #[default]
    Primary,
    /// The detection with the largest box area.
    Largest,
}

impl FacePolicy {
    pub fn select<'a>(&self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        match self {
            FacePolicy::Primary => faces.first(),
            FacePolicy::Largest => faces
                .iter()
                .reduce(|best, face| if face.area() > best.area() { face } else { best }),
        }
    }
}

impl FromStr for FacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "first" => Ok(FacePolicy::Primary),
            "largest" => Ok(FacePolicy::Largest),
            other => Err(format!("unknown face policy: {other}")),
        }
    }
}

/// Whether repeated matches for one identity are all written to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Every successful match is recorded.
    #[default]
    None,
    /// Matches within this long of the identity's last recorded mark are not recorded again.
    Window(Duration),
}

impl DedupPolicy {
    /// `0` seconds disables deduplication.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            DedupPolicy::None
        } else {
            DedupPolicy::Window(Duration::from_secs(secs))
        }
    }
}
