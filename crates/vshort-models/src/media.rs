//! Stock media search models.

use serde::{Deserialize, Serialize};

/// Shortest footage accepted for a content unit (seconds).
pub const MIN_MEDIA_DURATION_SECS: f64 = 3.0;

/// Longest footage accepted for a content unit (seconds).
pub const MAX_MEDIA_DURATION_SECS: f64 = 15.0;

/// Only MP4 variants are playable by the assembly stage.
pub const PLAYABLE_FILE_TYPE: &str = "video/mp4";

/// Preferred resolution tiers as `(width, height)`, best first.
pub const QUALITY_TIERS: &[(u32, u32)] = &[(1080, 1920), (608, 1080), (406, 720)];

/// Minimum resolution any selected variant must meet.
pub const MIN_RESOLUTION: (u32, u32) = (406, 720);

/// One downloadable rendition of a search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFileVariant {
    pub link: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_type: String,
}

impl MediaFileVariant {
    fn meets(&self, width: u32, height: u32) -> bool {
        self.file_type == PLAYABLE_FILE_TYPE
            && self.width.unwrap_or(0) >= width
            && self.height.unwrap_or(0) >= height
    }
}

/// Raw search hit as returned by the search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaCandidate {
    pub id: String,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Preview image
    pub image: Option<String>,
    pub files: Vec<MediaFileVariant>,
    /// Author credited in the attribution overlay
    pub author: Option<String>,
}

impl MediaCandidate {
    /// Duration falls inside the accepted window.
    pub fn has_usable_duration(&self) -> bool {
        (MIN_MEDIA_DURATION_SECS..=MAX_MEDIA_DURATION_SECS).contains(&self.duration_secs)
    }

    /// Best playable variant, if any meets the resolution floor.
    pub fn best_variant(&self) -> Option<&MediaFileVariant> {
        select_best_variant(&self.files)
    }

    /// Build the descriptor for this candidate using its best variant.
    ///
    /// Returns `None` when no variant is playable.
    pub fn to_descriptor(&self, page: u32) -> Option<MediaDescriptor> {
        let variant = self.best_variant()?;
        Some(MediaDescriptor {
            id: self.id.clone(),
            source_url: variant.link.clone(),
            thumbnail_url: self.image.clone(),
            duration_secs: self.duration_secs,
            width: variant.width.unwrap_or(self.width),
            height: variant.height.unwrap_or(self.height),
            page,
            attribution: self
                .author
                .as_ref()
                .map(|name| format!("Video by {} from Pexels", name)),
        })
    }
}

/// Pick the first playable variant by preferred tier, falling back to the
/// minimum resolution floor.
pub fn select_best_variant(files: &[MediaFileVariant]) -> Option<&MediaFileVariant> {
    for &(width, height) in QUALITY_TIERS {
        if let Some(file) = files.iter().find(|f| f.meets(width, height)) {
            return Some(file);
        }
    }

    let (width, height) = MIN_RESOLUTION;
    files.iter().find(|f| f.meets(width, height))
}

/// Reusable media descriptor selected for a content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Provider resource id (registry key)
    pub id: String,
    /// Download URL of the selected variant
    pub source_url: String,
    pub thumbnail_url: Option<String>,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Search page the descriptor was found on
    pub page: u32,
    pub attribution: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(width: u32, height: u32, file_type: &str) -> MediaFileVariant {
        MediaFileVariant {
            link: format!("https://cdn.example/{}x{}", width, height),
            width: Some(width),
            height: Some(height),
            file_type: file_type.to_string(),
        }
    }

    fn candidate(duration_secs: f64, files: Vec<MediaFileVariant>) -> MediaCandidate {
        MediaCandidate {
            id: "42".to_string(),
            duration_secs,
            width: 1080,
            height: 1920,
            image: None,
            files,
            author: Some("Jane".to_string()),
        }
    }

    #[test]
    fn test_best_variant_prefers_highest_tier() {
        let files = vec![
            variant(406, 720, "video/mp4"),
            variant(1080, 1920, "video/mp4"),
            variant(608, 1080, "video/mp4"),
        ];
        let best = select_best_variant(&files).unwrap();
        assert_eq!(best.height, Some(1920));
    }

    #[test]
    fn test_best_variant_skips_non_mp4() {
        let files = vec![
            variant(1080, 1920, "video/webm"),
            variant(608, 1080, "video/mp4"),
        ];
        let best = select_best_variant(&files).unwrap();
        assert_eq!(best.width, Some(608));
    }

    #[test]
    fn test_best_variant_below_floor() {
        let files = vec![variant(360, 640, "video/mp4")];
        assert!(select_best_variant(&files).is_none());

        let missing_dims = vec![MediaFileVariant {
            link: "x".into(),
            width: None,
            height: None,
            file_type: "video/mp4".into(),
        }];
        assert!(select_best_variant(&missing_dims).is_none());
    }

    #[test]
    fn test_duration_window() {
        assert!(candidate(3.0, vec![]).has_usable_duration());
        assert!(candidate(15.0, vec![]).has_usable_duration());
        assert!(!candidate(2.9, vec![]).has_usable_duration());
        assert!(!candidate(15.5, vec![]).has_usable_duration());
    }

    #[test]
    fn test_to_descriptor() {
        let c = candidate(8.0, vec![variant(1080, 1920, "video/mp4")]);
        let d = c.to_descriptor(2).unwrap();
        assert_eq!(d.id, "42");
        assert_eq!(d.page, 2);
        assert_eq!(d.source_url, "https://cdn.example/1080x1920");
        assert_eq!(d.attribution.as_deref(), Some("Video by Jane from Pexels"));

        assert!(candidate(8.0, vec![]).to_descriptor(1).is_none());
    }
}
