//! Timestamp formatting for subtitle scripts.

/// Format seconds as an ASS timestamp `H:MM:SS.cc`.
///
/// Centiseconds are floored; negative input is clamped to zero.
///
/// # Examples
/// ```
/// use vshort_models::timestamp::format_ass_timestamp;
/// assert_eq!(format_ass_timestamp(0.0), "0:00:00.00");
/// assert_eq!(format_ass_timestamp(3725.5), "1:02:05.50");
/// ```
pub fn format_ass_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    // Round to whole microseconds first so 12.8 does not floor to 12.79
    let total_centis = ((seconds * 1_000_000.0).round() as u64) / 10_000;

    let hours = total_centis / 360_000;
    let minutes = (total_centis % 360_000) / 6_000;
    let secs = (total_centis % 6_000) / 100;
    let centis = total_centis % 100;

    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, centis)
}
