//! Pipeline metrics.
//!
//! Counters and histograms are recorded through the `metrics` facade; the
//! binary installs no exporter, so they are no-ops unless an embedding
//! application provides a recorder.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Backoff waits after a rate-limit response, by operation.
    pub const RATE_LIMIT_RETRIES_TOTAL: &str = "vshort_rate_limit_retries_total";

    /// Response cache lookups by cache and outcome (`hit` or `miss`).
    pub const CACHE_LOOKUPS_TOTAL: &str = "vshort_cache_lookups_total";

    /// Finished pipeline tasks by stage and outcome.
    pub const TASKS_TOTAL: &str = "vshort_tasks_total";

    /// Wall time of a task attempt in seconds, by stage.
    pub const TASK_DURATION_SECONDS: &str = "vshort_task_duration_seconds";
}

pub fn record_rate_limit_retry(operation: &str) {
    counter!(
        names::RATE_LIMIT_RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_cache_lookup(cache: &str, hit: bool) {
    counter!(
        names::CACHE_LOOKUPS_TOTAL,
        "cache" => cache.to_string(),
        "outcome" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

/// Record one task attempt.
pub fn record_task_attempt(stage: &str, succeeded: bool, elapsed_secs: f64) {
    counter!(
        names::TASKS_TOTAL,
        "stage" => stage.to_string(),
        "outcome" => if succeeded { "succeeded" } else { "failed" }
    )
    .increment(1);

    histogram!(
        names::TASK_DURATION_SECONDS,
        "stage" => stage.to_string()
    )
    .record(elapsed_secs);
}
