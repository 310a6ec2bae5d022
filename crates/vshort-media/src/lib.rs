//! FFmpeg CLI wrapper and timing synchronization for vshort.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a cancellable runner
//! - Duration probing via FFprobe
//! - The [`Transcoder`] seam used by clip creation and assembly
//! - Audio/video/subtitle timing synchronization
//! - ASS subtitle generation, clip creation and final assembly

pub mod assembly;
pub mod clip;
pub mod command;
pub mod error;
pub mod probe;
pub mod subtitles;
pub mod sync;
pub mod transcoder;

pub use assembly::{assemble_final_video, AssembledVideo, AssemblyPaths, AssemblyRequest};
pub use clip::{create_clip, ClipPaths, ClipRequest};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegProgress, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::probe_duration;
pub use subtitles::{render_ass, write_ass, SubtitleStyle};
pub use sync::{verify_concatenation, ConcatVerification, TimingSynchronizer};
pub use transcoder::{FfmpegTranscoder, Transcoder};
