//! Final video assembly.
//!
//! Rendered clips are concatenated in order, followed by an optional closing
//! slate, and the subtitle track built from the clip durations is burned in.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use vshort_models::RenderedClip;

use crate::clip::AUDIO_BITRATE;
use crate::command::{escape_filter_path, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::subtitles::{write_ass, SubtitleStyle};
use crate::sync::{ConcatVerification, TimingSynchronizer};
use crate::transcoder::Transcoder;

/// Inputs for assembling one topic's video.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    /// Clips in final order
    pub clips: Vec<RenderedClip>,
    /// Closing slate appended after the last clip, skipped when missing
    pub slate_path: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub output_path: PathBuf,
    pub style: SubtitleStyle,
}

/// Intermediate files written during assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyPaths {
    pub prepared_slate: PathBuf,
    pub concat_list: PathBuf,
    pub merged: PathBuf,
    pub subtitles: PathBuf,
}

impl AssemblyPaths {
    pub fn in_dir(work_dir: &Path) -> Self {
        Self {
            prepared_slate: work_dir.join("prepared_slate.mp4"),
            concat_list: work_dir.join("filelist.txt"),
            merged: work_dir.join("merged.mp4"),
            subtitles: work_dir.join("subtitles.ass"),
        }
    }

    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.prepared_slate.clone(),
            self.concat_list.clone(),
            self.merged.clone(),
            self.subtitles.clone(),
        ]
    }
}

/// Result of assembling a video.
#[derive(Debug, Clone)]
pub struct AssembledVideo {
    pub path: PathBuf,
    /// Probed duration of the concatenated video
    pub duration: f64,
    pub expected_duration: f64,
    pub verification: ConcatVerification,
}

/// Re-encode the closing slate so it concatenates cleanly.
///
/// Returns `None` when the slate does not exist.
pub async fn prepare_slate<T>(
    transcoder: &T,
    slate: &Path,
    output: &Path,
) -> MediaResult<Option<PathBuf>>
where
    T: Transcoder + ?Sized,
{
    if !tokio::fs::try_exists(slate).await.unwrap_or(false) {
        warn!(path = %slate.display(), "Closing slate not found, assembling without it");
        return Ok(None);
    }

    let command = FfmpegCommand::new(slate, output)
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .faststart();

    let prepared = transcoder.run(&command).await?;
    info!(path = %prepared.display(), "Prepared closing slate");
    Ok(Some(prepared))
}

/// Concat demuxer list with absolute paths.
pub fn render_concat_list(entries: &[PathBuf]) -> String {
    entries
        .iter()
        .map(|entry| {
            let absolute = std::path::absolute(entry).unwrap_or_else(|_| entry.clone());
            // Single quotes close, escape and reopen in the concat syntax
            let quoted = absolute.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'", quoted)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenate `clips` plus an optional slate, capped at the expected total,
/// and check the result's length.
pub async fn concat_clips<T>(
    transcoder: &T,
    sync: &TimingSynchronizer,
    clips: &[RenderedClip],
    slate: Option<&Path>,
    paths: &AssemblyPaths,
) -> MediaResult<AssembledVideo>
where
    T: Transcoder + ?Sized,
{
    if clips.is_empty() {
        return Err(MediaError::InvalidMedia("no clips to concatenate".to_string()));
    }

    let slate_duration = match slate {
        Some(path) => Some(transcoder.probe_duration(path).await?),
        None => None,
    };
    let durations: Vec<f64> = clips.iter().map(|c| c.duration).collect();
    let expected = sync.expected_total(&durations, slate_duration);

    let mut entries: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
    if let Some(path) = slate {
        entries.push(path.to_path_buf());
    }
    tokio::fs::write(&paths.concat_list, render_concat_list(&entries)).await?;

    info!(
        clips = clips.len(),
        slate = slate.is_some(),
        expected,
        "Concatenating clips"
    );

    let command = FfmpegCommand::new(&paths.concat_list, &paths.merged)
        .input_args(["-f", "concat", "-safe", "0"])
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .faststart()
        .output_duration(expected);
    let merged = transcoder.run(&command).await?;

    let actual = transcoder.probe_duration(&merged).await?;
    let verification = sync.verify_concatenation(actual, expected);

    Ok(AssembledVideo {
        path: merged,
        duration: actual,
        expected_duration: expected,
        verification,
    })
}

/// Burn an ASS script into `video`.
pub async fn burn_subtitles<T>(
    transcoder: &T,
    video: &Path,
    subtitles: &Path,
    style: &SubtitleStyle,
    output: &Path,
) -> MediaResult<PathBuf>
where
    T: Transcoder + ?Sized,
{
    for input in [video, subtitles] {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    let subtitles_abs = std::path::absolute(subtitles)?;
    let command = FfmpegCommand::new(video, output)
        .video_filters([format!(
            "subtitles=filename='{}':force_style='{}'",
            escape_filter_path(&subtitles_abs),
            style.force_style()
        )])
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .audio_codec("copy")
        .faststart()
        .output_args(["-max_muxing_queue_size", "9999"]);

    let rendered = transcoder.run(&command).await?;
    info!(path = %rendered.display(), "Rendered subtitles");
    Ok(rendered)
}

/// Assemble the final video: slate, concatenation, subtitles.
pub async fn assemble_final_video<T>(
    transcoder: &T,
    sync: &TimingSynchronizer,
    request: &AssemblyRequest,
) -> MediaResult<AssembledVideo>
where
    T: Transcoder + ?Sized,
{
    let paths = AssemblyPaths::in_dir(&request.work_dir);

    let slate = match &request.slate_path {
        Some(path) => prepare_slate(transcoder, path, &paths.prepared_slate).await?,
        None => None,
    };

    let merged = concat_clips(transcoder, sync, &request.clips, slate.as_deref(), &paths).await?;

    let sentences: Vec<String> = request.clips.iter().map(|c| c.sentence.clone()).collect();
    let durations: Vec<f64> = request.clips.iter().map(|c| c.duration).collect();
    let timeline = sync.build_subtitle_timeline(&sentences, &durations)?;
    write_ass(&paths.subtitles, &timeline, &request.style).await?;

    let path = burn_subtitles(
        transcoder,
        &merged.path,
        &paths.subtitles,
        &request.style,
        &request.output_path,
    )
    .await?;

    Ok(AssembledVideo { path, ..merged })
}
