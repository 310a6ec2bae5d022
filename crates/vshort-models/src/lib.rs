//! Shared data models for the vshort pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Output video formats and search orientation
//! - Stock media search hits and the descriptors chosen from them
//! - Content units flowing through the production stages
//! - Pipeline task state
//! - Timing plans, subtitle cues and timestamp formatting

pub mod content;
pub mod format;
pub mod media;
pub mod task;
pub mod timestamp;
pub mod timing;

// Re-export common types
pub use content::{ContentUnit, RenderedClip};
pub use format::{FormatError, Orientation, VideoFormat};
pub use media::{select_best_variant, MediaCandidate, MediaDescriptor, MediaFileVariant};
pub use task::TaskState;
pub use timestamp::format_ass_timestamp;
pub use timing::{SubtitleCue, SyncPlan};
