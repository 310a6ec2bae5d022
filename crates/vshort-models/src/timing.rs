//! Timing plans and subtitle cues.

use serde::{Deserialize, Serialize};

/// Adjustment plan that makes a unit's audio and video co-terminate.
///
/// Both streams are produced independently to exactly `target_duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Shared length of the adjusted audio and video (seconds)
    pub target_duration: f64,
    /// Source video duration divided by `target_duration`
    pub speed_factor: f64,
    /// Trailing silence appended to the narration (seconds)
    pub padding_duration: f64,
}

impl SyncPlan {
    /// Presentation timestamp multiplier for `setpts`.
    pub fn pts_multiplier(&self) -> f64 {
        if self.speed_factor > 0.0 {
            1.0 / self.speed_factor
        } else {
            1.0
        }
    }
}

/// One timed subtitle line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    /// Emitted verbatim
    pub text: String,
}

impl SubtitleCue {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
