//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::retry::RetryPolicy;
use crate::runner::RunnerConfig;

pub const DEFAULT_CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PEXELS_SEARCH_URL: &str = "https://api.pexels.com/videos/search";

/// Pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    pub openai_api_key: String,
    pub pexels_api_key: String,
    pub claude_api_key: String,

    pub claude_url: String,
    pub claude_model: String,
    pub openai_chat_url: String,
    pub openai_speech_url: String,
    pub openai_model: String,
    pub pexels_search_url: String,

    /// Scratch directory for intermediate media
    pub temp_dir: PathBuf,
    /// JSON store of already-used footage
    pub registry_path: PathBuf,
    /// Closing slate appended to every video, skipped when missing
    pub slate_path: PathBuf,
    /// Directory receiving finished videos
    pub output_dir: PathBuf,

    /// Tasks in flight per stage
    pub concurrency: usize,
    /// Extra attempts per failed task
    pub task_retries: u32,
    /// Attempts per remote call while rate limited
    pub rate_limit_attempts: u32,
    pub rate_limit_base_delay: Duration,

    /// Budget for one remote API call
    pub request_timeout: Duration,
    /// Budget for one footage download
    pub download_timeout: Duration,
    /// Budget for one FFmpeg run
    pub ffmpeg_timeout: Duration,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("claude_url", &self.claude_url)
            .field("claude_model", &self.claude_model)
            .field("openai_chat_url", &self.openai_chat_url)
            .field("openai_speech_url", &self.openai_speech_url)
            .field("openai_model", &self.openai_model)
            .field("pexels_search_url", &self.pexels_search_url)
            .field("temp_dir", &self.temp_dir)
            .field("registry_path", &self.registry_path)
            .field("slate_path", &self.slate_path)
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .field("task_retries", &self.task_retries)
            .field("rate_limit_attempts", &self.rate_limit_attempts)
            .field("rate_limit_base_delay", &self.rate_limit_base_delay)
            .field("request_timeout", &self.request_timeout)
            .field("download_timeout", &self.download_timeout)
            .field("ffmpeg_timeout", &self.ffmpeg_timeout)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    /// Defaults around the given API keys.
    pub fn with_keys(
        openai_api_key: impl Into<String>,
        pexels_api_key: impl Into<String>,
        claude_api_key: impl Into<String>,
    ) -> Self {
        Self {
            openai_api_key: openai_api_key.into(),
            pexels_api_key: pexels_api_key.into(),
            claude_api_key: claude_api_key.into(),
            claude_url: DEFAULT_CLAUDE_URL.to_string(),
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            openai_chat_url: DEFAULT_OPENAI_CHAT_URL.to_string(),
            openai_speech_url: DEFAULT_OPENAI_SPEECH_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            pexels_search_url: DEFAULT_PEXELS_SEARCH_URL.to_string(),
            temp_dir: PathBuf::from("temp"),
            registry_path: PathBuf::from("used_videos.json"),
            slate_path: PathBuf::from("logo.mp4"),
            output_dir: PathBuf::from("."),
            concurrency: 4,
            task_retries: 2,
            rate_limit_attempts: 3,
            rate_limit_base_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            ffmpeg_timeout: Duration::from_secs(600),
        }
    }

    /// Create config from environment variables.
    ///
    /// The three API keys are required; everything else has a default.
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::with_keys(
            required("OPENAI_API_KEY")?,
            required("PEXELS_API_KEY")?,
            required("CLAUDE_API_KEY")?,
        );

        let config = Self {
            claude_url: env_string("CLAUDE_BASE_URL").unwrap_or(defaults.claude_url.clone()),
            claude_model: env_string("CLAUDE_MODEL").unwrap_or(defaults.claude_model.clone()),
            openai_chat_url: env_string("OPENAI_CHAT_URL")
                .unwrap_or(defaults.openai_chat_url.clone()),
            openai_speech_url: env_string("OPENAI_SPEECH_URL")
                .unwrap_or(defaults.openai_speech_url.clone()),
            openai_model: env_string("OPENAI_MODEL").unwrap_or(defaults.openai_model.clone()),
            pexels_search_url: env_string("PEXELS_VIDEO_SEARCH_URL")
                .unwrap_or(defaults.pexels_search_url.clone()),
            temp_dir: env_string("VSHORT_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir.clone()),
            registry_path: env_string("VSHORT_REGISTRY_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path.clone()),
            slate_path: env_string("VSHORT_SLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.slate_path.clone()),
            output_dir: env_string("VSHORT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir.clone()),
            concurrency: env_parse("VSHORT_CONCURRENCY")?.unwrap_or(defaults.concurrency),
            task_retries: env_parse("VSHORT_TASK_RETRIES")?.unwrap_or(defaults.task_retries),
            rate_limit_attempts: env_parse("VSHORT_RATE_LIMIT_ATTEMPTS")?
                .unwrap_or(defaults.rate_limit_attempts),
            rate_limit_base_delay: env_parse("VSHORT_RATE_LIMIT_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit_base_delay),
            request_timeout: env_parse("VSHORT_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            download_timeout: env_parse("VSHORT_DOWNLOAD_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            ffmpeg_timeout: env_parse("VSHORT_FFMPEG_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.concurrency == 0 {
            return Err(PipelineError::config("concurrency must be at least 1"));
        }
        if self.rate_limit_attempts == 0 {
            return Err(PipelineError::config("rate limit attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            concurrency: self.concurrency,
            retries_per_task: self.task_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.rate_limit_attempts)
            .with_base_delay(self.rate_limit_base_delay)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> PipelineResult<String> {
    env_string(name).ok_or_else(|| PipelineError::config(format!("{} is not set", name)))
}

fn env_parse<T: FromStr>(name: &str) -> PipelineResult<Option<T>> {
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| PipelineError::config(format!("{} has invalid value '{}'", name, raw))),
        None => Ok(None),
    }
}
