//! Content unit models.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::MediaDescriptor;

/// One narration sentence and everything derived from it.
///
/// Created by the planning stage and progressively enriched: the media stage
/// fills `video_path`/`audio_path`, the edit stage `clip_path`/`duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Position of the sentence in the script
    pub index: usize,
    pub sentence: String,
    /// Search keywords, most relevant first
    pub keywords: Vec<String>,
    pub media: MediaDescriptor,
    #[serde(default)]
    pub video_path: Option<PathBuf>,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    #[serde(default)]
    pub clip_path: Option<PathBuf>,
    /// Rendered clip duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
}

impl ContentUnit {
    pub fn new(
        index: usize,
        sentence: impl Into<String>,
        keywords: Vec<String>,
        media: MediaDescriptor,
    ) -> Self {
        Self {
            index,
            sentence: sentence.into(),
            keywords,
            media,
            video_path: None,
            audio_path: None,
            clip_path: None,
            duration: None,
        }
    }

    /// Both source artifacts are present.
    pub fn has_media_files(&self) -> bool {
        self.video_path.is_some() && self.audio_path.is_some()
    }

    /// Keywords joined for logs and registry contexts.
    pub fn keywords_label(&self) -> String {
        self.keywords.join(", ")
    }
}

/// A synchronized clip ready for final assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedClip {
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
    pub sentence: String,
}
