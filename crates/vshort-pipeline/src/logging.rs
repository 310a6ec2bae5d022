//! Structured task logging and subscriber setup.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Output is JSON when `LOG_FORMAT=json`, coloured text otherwise. The filter
/// comes from `RUST_LOG` with `vshort` crates at `info` unless overridden.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("vshort=info,vshort_pipeline=info,vshort_media=info,warn")
    });

    let result = if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    };

    // A subscriber installed by an embedding application wins
    let _ = result;
}

/// Logger for one task of a pipeline stage.
///
/// Every event carries the `stage` and `task` fields.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    stage: String,
    task: usize,
}

impl TaskLogger {
    pub fn new(stage: &str, task: usize) -> Self {
        Self {
            stage: stage.to_string(),
            task,
        }
    }

    pub fn log_start(&self, attempt: u32) {
        info!(stage = %self.stage, task = self.task, attempt, "Task started");
    }

    pub fn log_retry(&self, attempt: u32, reason: &str) {
        warn!(
            stage = %self.stage,
            task = self.task,
            attempt,
            "Task attempt failed, requeued: {}", reason
        );
    }

    pub fn log_success(&self, attempts: u32, elapsed_secs: f64) {
        info!(
            stage = %self.stage,
            task = self.task,
            attempts,
            elapsed_secs,
            "Task succeeded"
        );
    }

    pub fn log_failure(&self, attempts: u32, reason: &str) {
        error!(
            stage = %self.stage,
            task = self.task,
            attempts,
            "Task failed: {}", reason
        );
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn task(&self) -> usize {
        self.task
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("task", stage = %self.stage, task = self.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_logger() {
        let logger = TaskLogger::new("edit", 3);
        assert_eq!(logger.stage(), "edit");
        assert_eq!(logger.task(), 3);

        logger.log_start(1);
        logger.log_retry(1, "ffmpeg exited");
        logger.log_success(2, 1.5);
        let _span = logger.create_span();
    }
}
