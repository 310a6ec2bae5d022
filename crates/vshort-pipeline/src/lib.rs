//! Topic-to-short-video production pipeline.
//!
//! This crate provides:
//! - Rate-limit aware retry around remote calls
//! - Memoizing response caches and the used-footage registry
//! - A bounded-concurrency task runner with per-task retry
//! - Providers for text generation, footage search, speech and download
//! - Content planning, operator review and the production stages
//! - Temp workspace cleanup and shutdown coordination

pub mod cache;
pub mod config;
pub mod console;
pub mod content;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod review;
pub mod runner;
pub mod shutdown;
pub mod stages;
pub mod workspace;

pub use cache::{CacheKey, ResponseCache};
pub use config::PipelineConfig;
pub use console::{Console, TopicSource};
pub use content::ContentService;
pub use error::{PipelineError, PipelineResult};
pub use logging::{init_tracing, TaskLogger};
pub use registry::UsedResourceRegistry;
pub use retry::{RateLimitedExecutor, RetryOutcome, RetryPolicy};
pub use review::{auto_review, review_plan, ReviewDecision, ReviewSource};
pub use runner::{BatchReport, ConcurrentPipelineRunner, RunnerConfig};
pub use shutdown::{RunOutcome, ShutdownCoordinator};
pub use stages::{produce_topic, ProductionContext, ReviewMode, RunMode};
pub use workspace::{sanitize_file_name, TempWorkspace};
