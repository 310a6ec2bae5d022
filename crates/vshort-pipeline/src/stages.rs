//! Production stages for one topic: media files, clip editing, final video.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;
use vshort_media::{
    assemble_final_video, create_clip, AssembledVideo, AssemblyPaths, AssemblyRequest, ClipPaths,
    ClipRequest, SubtitleStyle, TimingSynchronizer, Transcoder,
};
use vshort_models::{ContentUnit, RenderedClip, VideoFormat};

use crate::content::ContentService;
use crate::error::{PipelineError, PipelineResult};
use crate::providers::{MediaFetcher, SpeechProvider};
use crate::retry::RateLimitedExecutor;
use crate::review::{auto_review, review_plan, ReviewSource};
use crate::runner::{BatchReport, ConcurrentPipelineRunner};
use crate::workspace::{sanitize_file_name, TempWorkspace};

pub const MEDIA_STAGE: &str = "media";
pub const EDIT_STAGE: &str = "edit";

/// Operating mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Pick one topic and review every unit
    Manual,
    /// Pick one topic, approve units automatically
    Auto,
    /// Produce every suggested topic unattended, continuing past failures
    FullAuto,
}

impl RunMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, RunMode::Auto | RunMode::FullAuto)
    }

    pub fn is_full_auto(&self) -> bool {
        matches!(self, RunMode::FullAuto)
    }
}

/// How a content plan gets approved.
pub enum ReviewMode<'a> {
    /// Keep every unit with footage, no questions asked
    Auto,
    Manual(&'a mut dyn ReviewSource),
}

/// Collaborators and settings shared by the production stages.
pub struct ProductionContext {
    pub speech: Arc<dyn SpeechProvider>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub executor: RateLimitedExecutor,
    pub runner: ConcurrentPipelineRunner,
    pub sync: TimingSynchronizer,
    pub workspace: Arc<TempWorkspace>,
    pub format: VideoFormat,
    /// Closing slate; skipped with a warning when the file is missing
    pub slate_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub style: SubtitleStyle,
}

impl ProductionContext {
    /// Download footage and synthesize narration for every unit.
    ///
    /// Units whose task fails are dropped; the rest keep plan order.
    pub async fn generate_media_files(
        &self,
        plan: Vec<ContentUnit>,
    ) -> PipelineResult<Vec<ContentUnit>> {
        info!(units = plan.len(), "Generating media files");
        let inputs: Vec<(usize, ContentUnit)> = plan.into_iter().enumerate().collect();

        let report = self
            .runner
            .run(MEDIA_STAGE, inputs, |(position, mut unit): (usize, ContentUnit)| {
                let speech = Arc::clone(&self.speech);
                let fetcher = Arc::clone(&self.fetcher);
                let executor = self.executor.clone();
                let video_path = self.workspace.path(&format!("video_{}.mp4", position));
                let audio_path = self.workspace.path(&format!("audio_{}.aac", position));

                async move {
                    let url = unit.media.source_url.clone();
                    let sentence = unit.sentence.clone();
                    let (video, audio) = tokio::try_join!(
                        fetcher.download(&url, &video_path),
                        executor.execute_with_retry("synthesize_speech", || {
                            speech.synthesize(&sentence, &audio_path)
                        }),
                    )?;
                    unit.video_path = Some(video);
                    unit.audio_path = Some(audio);
                    Ok(unit)
                }
            })
            .await;

        finish_stage(MEDIA_STAGE, report)
    }

    /// Render one synchronized clip per unit with media files.
    pub async fn sync_and_edit(
        &self,
        units: Vec<ContentUnit>,
    ) -> PipelineResult<Vec<RenderedClip>> {
        let requests: Vec<ClipRequest> = units
            .into_iter()
            .enumerate()
            .filter_map(|(position, unit)| match (unit.video_path, unit.audio_path) {
                (Some(video_path), Some(audio_path)) => Some(ClipRequest {
                    index: position,
                    video_path,
                    audio_path,
                    sentence: unit.sentence,
                    format: self.format,
                    attribution: unit.media.attribution,
                    work_dir: self.workspace.dir().to_path_buf(),
                }),
                _ => {
                    warn!(index = unit.index, "Unit has no media files, skipping");
                    None
                }
            })
            .collect();

        for request in &requests {
            for path in ClipPaths::for_request(request).all() {
                self.workspace.track(&path);
            }
        }

        info!(clips = requests.len(), "Editing clips");
        let report = self
            .runner
            .run(EDIT_STAGE, requests, |request: ClipRequest| {
                let transcoder = Arc::clone(&self.transcoder);
                let sync = self.sync;
                async move { Ok(create_clip(transcoder.as_ref(), &sync, &request).await?) }
            })
            .await;

        finish_stage(EDIT_STAGE, report)
    }

    /// Join the clips behind the slate and burn in subtitles.
    ///
    /// The result is written to `<output_dir>/<sanitized topic>.mp4`.
    pub async fn create_final_video(
        &self,
        topic: &str,
        clips: Vec<RenderedClip>,
    ) -> PipelineResult<AssembledVideo> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_path = self
            .output_dir
            .join(format!("{}.mp4", sanitize_file_name(topic)));

        for path in AssemblyPaths::in_dir(self.workspace.dir()).all() {
            self.workspace.track(&path);
        }

        let request = AssemblyRequest {
            clips,
            slate_path: self.slate_path.clone(),
            work_dir: self.workspace.dir().to_path_buf(),
            output_path,
            style: self.style.clone(),
        };

        let video = assemble_final_video(self.transcoder.as_ref(), &self.sync, &request).await?;
        info!(
            path = %video.path.display(),
            duration = video.duration,
            expected = video.expected_duration,
            "Final video created"
        );
        Ok(video)
    }
}

/// Successful values of a stage, or `Cancelled` if shutdown interrupted it.
fn finish_stage<T>(stage: &str, report: BatchReport<T>) -> PipelineResult<Vec<T>> {
    if report.was_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    for failure in &report.failures {
        warn!(
            stage,
            task = failure.index,
            attempts = failure.attempts,
            "Dropping failed task: {}",
            failure.reason
        );
    }
    info!(
        stage,
        succeeded = report.succeeded.len(),
        failed = report.failures.len(),
        "Stage finished"
    );
    Ok(report.into_values())
}

/// Plan, review and produce one topic.
///
/// Returns `None` when nothing was left to produce at some stage. Every event
/// of the run carries a fresh `run_id`.
pub async fn produce_topic(
    content: &ContentService,
    production: &ProductionContext,
    review: ReviewMode<'_>,
    topic: &str,
) -> PipelineResult<Option<AssembledVideo>> {
    let run_id = Uuid::new_v4();
    let span = info_span!("topic", %run_id, topic);
    run_topic(content, production, review, topic).instrument(span).await
}

async fn run_topic(
    content: &ContentService,
    production: &ProductionContext,
    review: ReviewMode<'_>,
    topic: &str,
) -> PipelineResult<Option<AssembledVideo>> {
    info!("Processing topic");

    let plan = content.build_content_plan(topic, production.format).await?;
    if plan.is_empty() {
        warn!(topic, "No content to produce");
        return Ok(None);
    }

    let reviewed = match review {
        ReviewMode::Auto => auto_review(plan)?,
        ReviewMode::Manual(source) => review_plan(content, source, plan, production.format).await?,
    };

    let with_media = production.generate_media_files(reviewed).await?;
    let clips = production.sync_and_edit(with_media).await?;
    if clips.is_empty() {
        warn!(topic, "No clips could be edited");
        return Ok(None);
    }

    let clip_count = clips.len();
    let video = production.create_final_video(topic, clips).await?;
    info!(
        topic,
        clips = clip_count,
        duration = video.duration,
        path = %video.path.display(),
        "Topic finished"
    );
    Ok(Some(video))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{TaskFailure, CANCELLED_REASON};

    #[test]
    fn test_run_mode_flags() {
        assert!(!RunMode::Manual.is_auto());
        assert!(RunMode::Auto.is_auto() && !RunMode::Auto.is_full_auto());
        assert!(RunMode::FullAuto.is_auto() && RunMode::FullAuto.is_full_auto());
    }

    #[test]
    fn test_finish_stage_drops_failures() {
        let report = BatchReport {
            succeeded: vec![(0, "a"), (2, "c")],
            failures: vec![TaskFailure {
                index: 1,
                attempts: 3,
                reason: "Task failed: bad input".to_string(),
            }],
        };
        assert_eq!(finish_stage("edit", report).unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_finish_stage_cancelled() {
        let report: BatchReport<&str> = BatchReport {
            succeeded: vec![(0, "a")],
            failures: vec![TaskFailure {
                index: 1,
                attempts: 1,
                reason: CANCELLED_REASON.to_string(),
            }],
        };
        assert!(finish_stage("media", report).unwrap_err().is_cancelled());
    }
}
