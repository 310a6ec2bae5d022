//! Output video format definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output frame size of the final video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
}

impl VideoFormat {
    /// Vertical short-form video.
    pub const SHORTS: VideoFormat = VideoFormat {
        width: 1080,
        height: 1920,
    };

    /// Horizontal video.
    pub const LANDSCAPE: VideoFormat = VideoFormat {
        width: 1920,
        height: 1080,
    };

    /// Orientation to request from the stock footage search.
    pub fn orientation(&self) -> Orientation {
        if self.width < self.height {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }

    /// `WxH` form used in cache keys and logs.
    pub fn dimensions(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self::LANDSCAPE
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error)]
#[error("Unknown video format: {0} (expected 'shorts' or 'landscape')")]
pub struct FormatError(pub String);

impl FromStr for VideoFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shorts" | "portrait" | "vertical" => Ok(Self::SHORTS),
            "landscape" | "horizontal" => Ok(Self::LANDSCAPE),
            other => Err(FormatError(other.to_string())),
        }
    }
}

/// Search orientation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
