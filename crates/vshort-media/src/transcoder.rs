//! Transcoder abstraction over the FFmpeg CLI.
//!
//! Clip creation and final assembly only describe *what* to run as
//! [`FfmpegCommand`]s; a [`Transcoder`] decides how. The production
//! implementation shells out to `ffmpeg`/`ffprobe`, tests substitute fakes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_duration, DEFAULT_PROBE_TIMEOUT};

/// Media transcoder collaborator.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Execute `command`, returning its output path.
    async fn run(&self, command: &FfmpegCommand) -> MediaResult<PathBuf>;
}

/// [`Transcoder`] backed by the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    probe_timeout: Duration,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            runner: FfmpegRunner::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill running FFmpeg processes when the signal flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_cancel(cancel_rx);
        self
    }

    /// Per-command budget for FFmpeg runs.
    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe_duration(path, self.probe_timeout).await
    }

    async fn run(&self, command: &FfmpegCommand) -> MediaResult<PathBuf> {
        let output = command.output_path().to_path_buf();
        self.runner
            .run_with_progress(command, |progress| {
                if progress.is_complete {
                    debug!(frames = progress.frame, "FFmpeg finished");
                }
            })
            .await?;
        Ok(output)
    }
}
