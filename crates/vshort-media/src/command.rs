//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    pub path: PathBuf,
    pub args: Vec<String>,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Output duration limit (`-t` after inputs)
    output_duration: Option<f64>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                path: input.as_ref().to_path_buf(),
                args: Vec::new(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            output_duration: None,
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add another input. Subsequent `input_arg` calls apply to it.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            path: path.as_ref().to_path_buf(),
            args: Vec::new(),
        });
        self
    }

    /// Add an argument before the most recently added `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(last) = self.inputs.last_mut() {
            last.args.push(arg.into());
        }
        self
    }

    /// Add multiple input arguments to the most recent input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(last) = self.inputs.last_mut() {
            last.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Limit the output to `seconds`.
    pub fn output_duration(mut self, seconds: f64) -> Self {
        self.output_duration = Some(seconds);
        self
    }

    /// Set a chain of video filters.
    pub fn video_filters<I, S>(self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chain: Vec<String> = filters.into_iter().map(Into::into).collect();
        self.output_arg("-vf").output_arg(chain.join(","))
    }

    /// Set a chain of audio filters.
    pub fn audio_filters<I, S>(self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chain: Vec<String> = filters.into_iter().map(Into::into).collect();
        self.output_arg("-af").output_arg(chain.join(","))
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Set audio sample rate.
    pub fn audio_rate(self, rate: u32) -> Self {
        self.output_arg("-ar").output_arg(rate.to_string())
    }

    /// Move the moov atom to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn inputs(&self) -> &[FfmpegInput] {
        &self.inputs
    }

    pub fn output_duration_limit(&self) -> Option<f64> {
        self.output_duration
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());

        if let Some(duration) = self.output_duration {
            args.push("-t".to_string());
            args.push(format!("{:.3}", duration));
        }

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Progress snapshot parsed from `-progress pipe:2`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: i64,
    pub frame: u64,
    pub speed: f64,
    pub is_complete: bool,
}

/// Runner for FFmpeg commands with timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(
        &self,
        cmd: &FfmpegCommand,
        progress_callback: F,
    ) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress lines feed the callback, everything else is kept as the error tail
        let progress_handle = tokio::spawn(async move {
            let mut current = FfmpegProgress::default();
            let mut tail: Vec<String> = Vec::new();

            while let Ok(Some(line)) = reader.next_line().await {
                match parse_progress_line(&line, &mut current) {
                    ProgressLine::Snapshot(progress) => progress_callback(progress),
                    ProgressLine::Field => {}
                    ProgressLine::Other => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.remove(0);
                        }
                        tail.push(line);
                    }
                }
            }
            tail
        });

        let result = self.wait_for_completion(&mut child).await;
        let tail = progress_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => Err(MediaError::ffmpeg_failed(
                message,
                Some(tail.join("\n")),
                exit_code,
            )),
            other => other,
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let timeout = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut cancel_rx = self.cancel_rx.clone();
        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => {
                    while !*rx.borrow() {
                        if rx.changed().await.is_err() {
                            // Sender gone, nobody can cancel any more
                            std::future::pending::<()>().await;
                        }
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = timeout => Waited::TimedOut,
            _ = cancelled => Waited::Cancelled,
        };

        let status = match waited {
            Waited::Exited(status) => status?,
            Waited::TimedOut => {
                let secs = self.timeout_secs.unwrap_or_default();
                warn!("FFmpeg timed out after {} seconds, killing process", secs);
                let _ = child.kill().await;
                return Err(MediaError::Timeout(secs));
            }
            Waited::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }
}

enum Waited {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

enum ProgressLine {
    /// A full progress block ended
    Snapshot(FfmpegProgress),
    /// A `key=value` progress field
    Field,
    Other,
}

/// Parse a progress line from FFmpeg's -progress output.
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> ProgressLine {
    let line = line.trim();

    let Some((key, value)) = line.split_once('=') else {
        return ProgressLine::Other;
    };

    match key {
        "out_time_ms" | "out_time_us" => {
            // FFmpeg reports microseconds under both keys
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return ProgressLine::Snapshot(current.clone());
        }
        "out_time" | "fps" | "bitrate" | "total_size" | "dup_frames" | "drop_frames" => {}
        _ if key.starts_with("stream_") => {}
        _ => return ProgressLine::Other,
    }

    ProgressLine::Field
}

/// Escape a file path for use as a filter option value
/// (`subtitles=filename=...`, `drawtext=textfile=...`).
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
