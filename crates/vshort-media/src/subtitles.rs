//! ASS subtitle script generation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;
use vshort_models::{format_ass_timestamp, SubtitleCue};

use crate::error::MediaResult;

const STYLE_FORMAT: &str = "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding";

const EVENT_FORMAT: &str =
    "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text";

/// Caption style used for the `Default` style line and for `force_style`
/// when burning the script into the video.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    /// ASS colours in `&HAABBGGRR` form
    pub primary_colour: String,
    pub secondary_colour: String,
    pub outline_colour: String,
    pub back_colour: String,
    pub bold: bool,
    pub border_style: u8,
    pub outline: u8,
    pub shadow: u8,
    /// Numpad alignment, 2 = bottom centre
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Pretendard Black".to_string(),
            font_size: 10,
            primary_colour: "&H00FFFFFF".to_string(),
            secondary_colour: "&H00000000".to_string(),
            outline_colour: "&H00000000".to_string(),
            back_colour: "&H80000000".to_string(),
            bold: true,
            border_style: 3,
            outline: 3,
            shadow: 1,
            alignment: 2,
            margin_l: 20,
            margin_r: 20,
            margin_v: 60,
        }
    }
}

impl SubtitleStyle {
    /// `Style:` line of the `[V4+ Styles]` section.
    pub fn style_line(&self) -> String {
        format!(
            "Style: Default,{},{},{},{},{},{},{},0,0,0,100,100,0,0,{},{},{},{},{},{},{},1",
            self.font_name,
            self.font_size,
            self.primary_colour,
            self.secondary_colour,
            self.outline_colour,
            self.back_colour,
            u8::from(self.bold),
            self.border_style,
            self.outline,
            self.shadow,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v,
        )
    }

    /// Override string for the FFmpeg `subtitles` filter.
    pub fn force_style(&self) -> String {
        [
            format!("Fontname={}", self.font_name),
            format!("FontSize={}", self.font_size),
            format!("PrimaryColour={}", self.primary_colour),
            format!("OutlineColour={}", self.outline_colour),
            format!("BackColour={}", self.back_colour),
            format!("BorderStyle={}", self.border_style),
            format!("Outline={}", self.outline),
            format!("Shadow={}", self.shadow),
            format!("Bold={}", u8::from(self.bold)),
            format!("Alignment={}", self.alignment),
            format!("MarginV={}", self.margin_v),
            format!("MarginL={}", self.margin_l),
            format!("MarginR={}", self.margin_r),
        ]
        .join(",")
    }
}

/// Render a complete ASS script for `cues`.
pub fn render_ass(cues: &[SubtitleCue], style: &SubtitleStyle) -> String {
    let mut script = String::new();

    script.push_str("[Script Info]\n");
    script.push_str("Title: Subtitles\n");
    script.push_str("ScriptType: v4.00+\n");
    script.push_str("Collisions: Normal\n");
    script.push_str("PlayDepth: 0\n\n");

    script.push_str("[V4+ Styles]\n");
    script.push_str(STYLE_FORMAT);
    script.push('\n');
    script.push_str(&style.style_line());
    script.push_str("\n\n");

    script.push_str("[Events]\n");
    script.push_str(EVENT_FORMAT);
    script.push('\n');

    for cue in cues {
        // Writing to a String cannot fail
        let _ = writeln!(
            script,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            format_ass_timestamp(cue.start),
            format_ass_timestamp(cue.end),
            escape_dialogue_text(&cue.text)
        );
    }

    script
}

/// Write the ASS script for `cues` to `path`.
pub async fn write_ass(
    path: impl AsRef<Path>,
    cues: &[SubtitleCue],
    style: &SubtitleStyle,
) -> MediaResult<PathBuf> {
    let path = path.as_ref();
    tokio::fs::write(path, render_ass(cues, style)).await?;
    info!(path = %path.display(), cues = cues.len(), "Wrote subtitle script");
    Ok(path.to_path_buf())
}

/// Raw newlines would end the `Dialogue:` record, so they become ASS hard
/// breaks. Everything else is passed through.
fn escape_dialogue_text(text: &str) -> String {
    text.replace("\r\n", "\\N").replace(['\n', '\r'], "\\N")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, end: f64, text: &str) -> SubtitleCue {
        SubtitleCue {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_default_style_line() {
        assert_eq!(
            SubtitleStyle::default().style_line(),
            "Style: Default,Pretendard Black,10,&H00FFFFFF,&H00000000,&H00000000,&H80000000,1,0,0,0,100,100,0,0,3,3,1,2,20,20,60,1"
        );
    }

    #[test]
    fn test_render_ass() {
        let cues = vec![cue(0.0, 2.5, "First line."), cue(2.5, 65.25, "It's 100% done, ok?")];
        let script = render_ass(&cues, &SubtitleStyle::default());

        assert!(script.starts_with("[Script Info]\n"));
        assert!(script.contains("[V4+ Styles]\n"));
        assert!(script.contains("[Events]\n"));
        assert!(script.contains("Dialogue: 0,0:00:00.00,0:00:02.50,Default,,0,0,0,,First line.\n"));
        assert!(script
            .contains("Dialogue: 0,0:00:02.50,0:01:05.25,Default,,0,0,0,,It's 100% done, ok?\n"));
        assert_eq!(script.matches("Dialogue:").count(), 2);
    }

    #[test]
    fn test_newlines_become_hard_breaks() {
        let script = render_ass(&[cue(0.0, 1.0, "two\nlines")], &SubtitleStyle::default());
        assert!(script.contains(",,two\\Nlines\n"));
    }

    #[test]
    fn test_force_style() {
        let style = SubtitleStyle::default().force_style();
        assert!(style.starts_with("Fontname=Pretendard Black,FontSize=10,"));
        assert!(style.contains("BorderStyle=3"));
        assert!(style.ends_with("MarginR=20"));
    }

    #[tokio::test]
    async fn test_write_ass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subtitles.ass");

        let written = write_ass(&path, &[cue(0.0, 1.0, "hi")], &SubtitleStyle::default())
            .await
            .unwrap();

        assert_eq!(written, path);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Dialogue: 0,0:00:00.00,0:00:01.00,Default,,0,0,0,,hi"));
    }
}
