//! FFprobe duration lookup.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Default ffprobe budget.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the container duration of an audio or video file, in seconds
/// rounded to milliseconds. Files without a duration report `0.0`.
pub async fn probe_duration(path: impl AsRef<Path>, timeout: Duration) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_duration(&output.stdout)
}

fn parse_duration(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(round_millis(duration))
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let json = br#"{"format": {"filename": "a.aac", "duration": "4.123456"}}"#;
        assert_eq!(parse_duration(json).unwrap(), 4.123);
    }

    #[test]
    fn test_parse_missing_duration() {
        let json = br#"{"format": {"filename": "still.png"}}"#;
        assert_eq!(parse_duration(json).unwrap(), 0.0);

        let json = br#"{"format": {"duration": "N/A"}}"#;
        assert_eq!(parse_duration(json).unwrap(), 0.0);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_duration(b"not json"),
            Err(MediaError::JsonParse(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe_duration("/nonexistent/clip.mp4", DEFAULT_PROBE_TIMEOUT).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
