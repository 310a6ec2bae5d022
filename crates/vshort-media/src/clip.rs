//! Synchronized clip creation.
//!
//! A clip is one content unit rendered to its own file: the stock footage is
//! scaled, cropped and retimed to the narration's target duration while the
//! narration is padded with silence to the same length, then both are muxed.
//! An optional attribution line is drawn in the bottom-right corner; if that
//! overlay fails the unattributed clip is used instead.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use vshort_models::{RenderedClip, SyncPlan, VideoFormat};

use crate::command::{escape_filter_path, FfmpegCommand};
use crate::error::MediaResult;
use crate::sync::TimingSynchronizer;
use crate::transcoder::Transcoder;

/// Output frame rate of every clip.
pub const CLIP_FPS: u32 = 30;

/// Audio settings shared by every AAC encode.
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Inputs for one clip.
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub index: usize,
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub sentence: String,
    pub format: VideoFormat,
    pub attribution: Option<String>,
    /// Directory receiving every intermediate and output file
    pub work_dir: PathBuf,
}

/// Files written while creating a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPaths {
    pub adjusted_video: PathBuf,
    pub padded_audio: PathBuf,
    pub merged: PathBuf,
    pub attribution_text: PathBuf,
    pub attributed: PathBuf,
}

impl ClipPaths {
    pub fn for_request(request: &ClipRequest) -> Self {
        let dir = &request.work_dir;
        Self {
            adjusted_video: dir.join(prefixed("adjusted", &request.video_path)),
            padded_audio: dir.join(prefixed("padded", &request.audio_path)),
            merged: dir.join(format!("clip_{}.mp4", request.index)),
            attribution_text: dir.join(format!("attribution_{}.txt", request.index)),
            attributed: dir.join(format!("clip_{}_attributed.mp4", request.index)),
        }
    }

    /// Every path, for temp-file tracking.
    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.adjusted_video.clone(),
            self.padded_audio.clone(),
            self.merged.clone(),
            self.attribution_text.clone(),
            self.attributed.clone(),
        ]
    }
}

fn prefixed(prefix: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    format!("{}_{}", prefix, name)
}

/// Scale/crop to the output format and retime to the plan's target.
pub fn adjust_video_command(
    input: &Path,
    output: &Path,
    format: VideoFormat,
    plan: &SyncPlan,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filters([
            format!(
                "scale={}:{}:force_original_aspect_ratio=increase",
                format.width, format.height
            ),
            format!("crop={}:{}", format.width, format.height),
            format!("setpts={:.6}*PTS", plan.pts_multiplier()),
            format!("fps={}", CLIP_FPS),
        ])
        .preset("medium")
        .crf(23)
        .video_codec("libx264")
        .output_args(["-pix_fmt", "yuv420p"])
        .faststart()
        .output_args(["-profile:v", "high", "-level", "4.1"])
        .output_duration(plan.target_duration)
}

/// Pad narration with trailing silence up to the plan's target.
pub fn pad_audio_command(input: &Path, output: &Path, plan: &SyncPlan) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .audio_filters([
            "asetpts=PTS-STARTPTS".to_string(),
            "aresample=async=1000".to_string(),
            format!("apad=pad_dur={:.3}", plan.padding_duration),
        ])
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .audio_rate(AUDIO_SAMPLE_RATE)
        .output_duration(plan.target_duration)
}

/// Mux adjusted video with padded audio.
pub fn merge_command(video: &Path, audio: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .input(audio)
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate(AUDIO_BITRATE)
        .audio_rate(AUDIO_SAMPLE_RATE)
        .output_args(["-map", "0:v:0", "-map", "1:a:0", "-shortest"])
        .output_args(["-max_interleave_delta", "0"])
        .faststart()
}

/// Draw the attribution text read from `text_file` in the bottom-right corner.
pub fn attribution_command(input: &Path, text_file: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filters([format!(
            "drawtext=textfile='{}':expansion=none:fontsize=20:fontcolor=white:x=w-tw-20:y=h-th-20",
            escape_filter_path(text_file)
        )])
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .audio_codec("copy")
}

/// Render one synchronized clip.
///
/// Probes both sources, derives the [`SyncPlan`], runs the video adjustment
/// and audio padding concurrently, muxes them, applies the attribution
/// overlay and probes the final file.
pub async fn create_clip<T>(
    transcoder: &T,
    sync: &TimingSynchronizer,
    request: &ClipRequest,
) -> MediaResult<RenderedClip>
where
    T: Transcoder + ?Sized,
{
    let paths = ClipPaths::for_request(request);

    let (audio_duration, video_duration) = tokio::try_join!(
        transcoder.probe_duration(&request.audio_path),
        transcoder.probe_duration(&request.video_path),
    )?;
    let plan = sync.plan(audio_duration, video_duration)?;

    info!(
        clip = request.index,
        format = %request.format,
        target = plan.target_duration,
        speed = plan.speed_factor,
        "Creating clip"
    );

    let adjust = adjust_video_command(
        &request.video_path,
        &paths.adjusted_video,
        request.format,
        &plan,
    );
    let pad = pad_audio_command(&request.audio_path, &paths.padded_audio, &plan);
    let (adjusted, padded) = tokio::try_join!(transcoder.run(&adjust), transcoder.run(&pad))?;

    let merged = transcoder
        .run(&merge_command(&adjusted, &padded, &paths.merged))
        .await?;

    let final_clip = match request.attribution.as_deref() {
        Some(text) if !text.trim().is_empty() => {
            apply_attribution(transcoder, &merged, text, &paths).await?
        }
        _ => merged,
    };

    let duration = transcoder.probe_duration(&final_clip).await?;
    info!(clip = request.index, duration, path = %final_clip.display(), "Clip ready");

    Ok(RenderedClip {
        path: final_clip,
        duration,
        sentence: request.sentence.clone(),
    })
}

/// Overlay attribution, falling back to `merged` on a media failure.
async fn apply_attribution<T>(
    transcoder: &T,
    merged: &Path,
    text: &str,
    paths: &ClipPaths,
) -> MediaResult<PathBuf>
where
    T: Transcoder + ?Sized,
{
    tokio::fs::write(&paths.attribution_text, text).await?;

    let command = attribution_command(merged, &paths.attribution_text, &paths.attributed);
    match transcoder.run(&command).await {
        Ok(path) => Ok(path),
        Err(e) if e.is_interrupted() => Err(e),
        Err(e) => {
            warn!(error = %e, "Attribution overlay failed, using clip without it");
            Ok(merged.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Transcoder that touches outputs and reports durations by file name.
    struct FakeTranscoder {
        durations: HashMap<String, f64>,
        fail_drawtext: bool,
        commands: Mutex<Vec<Vec<String>>>,
    }

    impl FakeTranscoder {
        fn new(durations: &[(&str, f64)]) -> Self {
            Self {
                durations: durations
                    .iter()
                    .map(|(name, d)| (name.to_string(), *d))
                    .collect(),
                fail_drawtext: false,
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.durations
                .get(&name)
                .copied()
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
        }

        async fn run(&self, command: &FfmpegCommand) -> MediaResult<PathBuf> {
            let args = command.build_args();
            let is_drawtext = args.iter().any(|a| a.starts_with("drawtext="));
            self.commands.lock().unwrap().push(args);
            if is_drawtext && self.fail_drawtext {
                return Err(MediaError::ffmpeg_failed("no font", None, Some(1)));
            }
            std::fs::write(command.output_path(), b"").unwrap();
            Ok(command.output_path().to_path_buf())
        }
    }

    fn request(dir: &Path, attribution: Option<&str>) -> ClipRequest {
        ClipRequest {
            index: 2,
            video_path: dir.join("video_2.mp4"),
            audio_path: dir.join("audio_2.aac"),
            sentence: "A sentence.".to_string(),
            format: VideoFormat::SHORTS,
            attribution: attribution.map(str::to_string),
            work_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_adjust_video_command() {
        let plan = SyncPlan {
            target_duration: 12.8,
            speed_factor: 2.0,
            padding_duration: 0.5,
        };
        let args = adjust_video_command(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            VideoFormat::SHORTS,
            &plan,
        )
        .build_args();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(
            args[vf + 1],
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setpts=0.500000*PTS,fps=30"
        );
        assert!(args.windows(2).any(|w| w[0] == "-pix_fmt" && w[1] == "yuv420p"));
        assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "12.800"));
    }

    #[test]
    fn test_pad_and_merge_commands() {
        let plan = SyncPlan {
            target_duration: 4.5,
            speed_factor: 1.0,
            padding_duration: 0.5,
        };
        let pad = pad_audio_command(Path::new("a.aac"), Path::new("p.aac"), &plan).build_args();
        let af = pad.iter().position(|a| a == "-af").unwrap();
        assert_eq!(pad[af + 1], "asetpts=PTS-STARTPTS,aresample=async=1000,apad=pad_dur=0.500");
        assert!(pad.windows(2).any(|w| w[0] == "-ar" && w[1] == "48000"));

        let merge =
            merge_command(Path::new("v.mp4"), Path::new("p.aac"), Path::new("m.mp4")).build_args();
        assert!(merge.contains(&"-shortest".to_string()));
        assert!(merge.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a:0"));
    }

    #[tokio::test]
    async fn test_create_clip_with_attribution() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FakeTranscoder::new(&[
            ("audio_2.aac", 4.0),
            ("video_2.mp4", 9.0),
            ("clip_2_attributed.mp4", 4.52),
        ]);

        let clip = create_clip(
            &transcoder,
            &TimingSynchronizer::new(),
            &request(dir.path(), Some("Video by Jane from Pexels")),
        )
        .await
        .unwrap();

        assert_eq!(clip.path, dir.path().join("clip_2_attributed.mp4"));
        assert_eq!(clip.duration, 4.52);
        assert_eq!(clip.sentence, "A sentence.");
        assert_eq!(transcoder.commands.lock().unwrap().len(), 4);

        let text = std::fs::read_to_string(dir.path().join("attribution_2.txt")).unwrap();
        assert_eq!(text, "Video by Jane from Pexels");
    }

    #[tokio::test]
    async fn test_attribution_failure_falls_back_to_merged_clip() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcoder = FakeTranscoder::new(&[
            ("audio_2.aac", 4.0),
            ("video_2.mp4", 9.0),
            ("clip_2.mp4", 4.5),
        ]);
        transcoder.fail_drawtext = true;

        let clip = create_clip(
            &transcoder,
            &TimingSynchronizer::new(),
            &request(dir.path(), Some("Video by Jane from Pexels")),
        )
        .await
        .unwrap();

        assert_eq!(clip.path, dir.path().join("clip_2.mp4"));
        assert_eq!(clip.duration, 4.5);
    }

    #[tokio::test]
    async fn test_create_clip_without_attribution() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FakeTranscoder::new(&[
            ("audio_2.aac", 4.0),
            ("video_2.mp4", 9.0),
            ("clip_2.mp4", 4.5),
        ]);

        let clip = create_clip(&transcoder, &TimingSynchronizer::new(), &request(dir.path(), None))
            .await
            .unwrap();

        assert_eq!(clip.path, dir.path().join("clip_2.mp4"));
        assert_eq!(transcoder.commands.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FakeTranscoder::new(&[("audio_2.aac", 4.0)]);

        let result =
            create_clip(&transcoder, &TimingSynchronizer::new(), &request(dir.path(), None)).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
