//! Audio/video/subtitle timing synchronization.
//!
//! Narration audio and stock footage are produced independently and never
//! match in length. For every content unit a [`SyncPlan`] fixes one target
//! duration that both streams are stretched or padded to, so the later mux is
//! a plain concatenation. The same durations, in final clip order, drive the
//! subtitle timeline and the check on the concatenated output.

use tracing::{debug, warn};
use vshort_models::{SubtitleCue, SyncPlan};

use crate::error::{MediaError, MediaResult};

/// Trailing buffer added after the narration (seconds).
pub const DEFAULT_TRAILING_BUFFER_SECS: f64 = 0.5;

/// Accepted drift between expected and actual concatenated length (seconds).
pub const DEFAULT_CONCAT_TOLERANCE_SECS: f64 = 1.0;

/// Absorbs float noise before rounding up to centiseconds.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Outcome of checking an assembled video's length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConcatVerification {
    Ok,
    Mismatch {
        actual: f64,
        expected: f64,
        delta: f64,
    },
}

impl ConcatVerification {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConcatVerification::Ok)
    }
}

/// Deterministic timing calculations for clip synchronization.
#[derive(Debug, Clone, Copy)]
pub struct TimingSynchronizer {
    pub trailing_buffer_secs: f64,
    pub tolerance_secs: f64,
}

impl Default for TimingSynchronizer {
    fn default() -> Self {
        Self {
            trailing_buffer_secs: DEFAULT_TRAILING_BUFFER_SECS,
            tolerance_secs: DEFAULT_CONCAT_TOLERANCE_SECS,
        }
    }
}

impl TimingSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Narration length plus the trailing buffer, rounded up to two decimals.
    pub fn compute_target_duration(&self, audio_duration: f64) -> f64 {
        let raw = (audio_duration.max(0.0) + self.trailing_buffer_secs) * 100.0;
        (raw - ROUNDING_EPSILON).ceil() / 100.0
    }

    /// Playback rate that makes the source footage span `target_duration`.
    pub fn compute_speed_factor(&self, original_video_duration: f64, target_duration: f64) -> f64 {
        if target_duration <= 0.0 {
            return 1.0;
        }
        original_video_duration / target_duration
    }

    /// Silence appended to the narration so it also lasts `target_duration`.
    pub fn compute_padding(&self, target_duration: f64, audio_duration: f64) -> f64 {
        (target_duration - audio_duration).max(0.0)
    }

    /// Full plan for one content unit.
    pub fn plan(&self, audio_duration: f64, original_video_duration: f64) -> MediaResult<SyncPlan> {
        if !audio_duration.is_finite() || audio_duration < 0.0 {
            return Err(MediaError::invalid_timing(format!(
                "audio duration must be non-negative, got {}",
                audio_duration
            )));
        }
        if !original_video_duration.is_finite() || original_video_duration <= 0.0 {
            return Err(MediaError::invalid_timing(format!(
                "video duration must be positive, got {}",
                original_video_duration
            )));
        }

        let target_duration = self.compute_target_duration(audio_duration);
        let plan = SyncPlan {
            target_duration,
            speed_factor: self.compute_speed_factor(original_video_duration, target_duration),
            padding_duration: self.compute_padding(target_duration, audio_duration),
        };

        debug!(
            audio = audio_duration,
            video = original_video_duration,
            target = plan.target_duration,
            speed = plan.speed_factor,
            padding = plan.padding_duration,
            "Computed sync plan"
        );

        Ok(plan)
    }

    /// Cumulative subtitle cues over clip durations in final order.
    pub fn build_subtitle_timeline(
        &self,
        sentences: &[String],
        durations: &[f64],
    ) -> MediaResult<Vec<SubtitleCue>> {
        if sentences.len() != durations.len() {
            return Err(MediaError::invalid_timing(format!(
                "{} sentences but {} durations",
                sentences.len(),
                durations.len()
            )));
        }

        let mut offset = 0.0;
        let mut timeline = Vec::with_capacity(sentences.len());

        for (sentence, &duration) in sentences.iter().zip(durations) {
            if !duration.is_finite() || duration < 0.0 {
                return Err(MediaError::invalid_timing(format!(
                    "clip duration must be non-negative, got {}",
                    duration
                )));
            }
            let start = offset;
            let end = start + duration;
            timeline.push(SubtitleCue {
                start,
                end,
                text: sentence.clone(),
            });
            offset = end;
        }

        Ok(timeline)
    }

    /// Expected length of the concatenation of `durations` plus an optional
    /// trailing asset.
    pub fn expected_total(&self, durations: &[f64], trailing: Option<f64>) -> f64 {
        durations.iter().sum::<f64>() + trailing.unwrap_or(0.0)
    }

    /// Compare the assembled length against the expected sum.
    ///
    /// A mismatch is logged and returned, never raised.
    pub fn verify_concatenation(&self, actual: f64, expected: f64) -> ConcatVerification {
        verify_concatenation(actual, expected, self.tolerance_secs)
    }
}

/// Compare `actual` against `expected` within `tolerance` seconds.
pub fn verify_concatenation(actual: f64, expected: f64, tolerance: f64) -> ConcatVerification {
    let delta = actual - expected;
    if delta.abs() <= tolerance {
        ConcatVerification::Ok
    } else {
        warn!(
            actual,
            expected,
            delta,
            "Assembled duration differs from expected total"
        );
        ConcatVerification::Mismatch {
            actual,
            expected,
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_target_duration() {
        let sync = TimingSynchronizer::new();
        assert!(approx(sync.compute_target_duration(12.3), 12.8));
        assert!(approx(sync.compute_target_duration(0.0), 0.5));
        assert!(approx(sync.compute_target_duration(1.234), 1.74));
        assert!(approx(sync.compute_target_duration(7.77), 8.27));
    }

    #[test]
    fn test_target_never_shorter_than_narration_plus_buffer() {
        let sync = TimingSynchronizer::new();
        for i in 0..2000 {
            let audio = i as f64 * 0.0137;
            let target = sync.compute_target_duration(audio);
            assert!(target + 1e-9 >= audio + 0.5, "audio {} target {}", audio, target);
            assert!(target < audio + 0.5 + 0.01 + 1e-9);
        }
    }

    #[test]
    fn test_plan() {
        let sync = TimingSynchronizer::new();
        let plan = sync.plan(4.0, 9.0).unwrap();
        assert!(approx(plan.target_duration, 4.5));
        assert!(approx(plan.speed_factor, 2.0));
        assert!(approx(plan.padding_duration, 0.5));
        // Stretching the footage by the factor lands exactly on the target
        assert!(approx(9.0 * plan.pts_multiplier(), plan.target_duration));
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        let sync = TimingSynchronizer::new();
        assert!(sync.plan(-1.0, 5.0).is_err());
        assert!(sync.plan(3.0, 0.0).is_err());
        assert!(sync.plan(f64::NAN, 5.0).is_err());
    }

    #[test]
    fn test_subtitle_timeline_is_contiguous() {
        let sync = TimingSynchronizer::new();
        let sentences: Vec<String> = ["one", "two's", "three"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let durations = [2.5, 3.25, 4.0];

        let timeline = sync.build_subtitle_timeline(&sentences, &durations).unwrap();
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].start, 0.0);
        for pair in timeline.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(approx(timeline[2].end, 9.75));
        // Verbatim text
        assert_eq!(timeline[1].text, "two's");
    }

    #[test]
    fn test_subtitle_timeline_length_mismatch() {
        let sync = TimingSynchronizer::new();
        let sentences = vec!["only".to_string()];
        assert!(sync.build_subtitle_timeline(&sentences, &[1.0, 2.0]).is_err());
        assert!(sync.build_subtitle_timeline(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_verify_concatenation() {
        let sync = TimingSynchronizer::new();
        assert!(sync.verify_concatenation(30.4, 30.0).is_ok());
        assert!(sync.verify_concatenation(29.0, 30.0).is_ok());

        match sync.verify_concatenation(35.0, 30.0) {
            ConcatVerification::Mismatch { delta, .. } => assert!(approx(delta, 5.0)),
            ConcatVerification::Ok => panic!("expected mismatch"),
        }
    }

    #[test]
    fn test_expected_total_with_trailing_slate() {
        let sync = TimingSynchronizer::new();
        assert!(approx(sync.expected_total(&[1.5, 2.5], Some(3.0)), 7.0));
        assert!(approx(sync.expected_total(&[1.5, 2.5], None), 4.0));
    }
}
