//! Scratch directory for intermediate media files.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::PipelineResult;

/// Name used when a topic sanitizes to nothing.
const FALLBACK_FILE_STEM: &str = "video";

/// Tracks every artifact handed out so cleanup can remove them.
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
    active: Mutex<BTreeSet<PathBuf>>,
}

/// Result of a cleanup pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
    pub dir_removed: bool,
}

impl TempWorkspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Recreate the directory empty and forget tracked files.
    pub async fn init(&self) -> PipelineResult<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed stale temp directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        self.active_files().clear();

        info!(dir = %self.dir.display(), "Temp directory ready");
        Ok(())
    }

    /// Path for `file_name` inside the workspace, tracked for cleanup.
    pub fn path(&self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.track(&path);
        path
    }

    /// Track a file created elsewhere inside the workspace.
    pub fn track(&self, path: &Path) {
        self.active_files().insert(path.to_path_buf());
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.active_files().iter().cloned().collect()
    }

    fn active_files(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delete every tracked file, then the directory if nothing is left.
    ///
    /// Best effort: failures are logged and counted, never returned.
    pub async fn cleanup(&self) -> CleanupReport {
        let files: Vec<PathBuf> = std::mem::take(&mut *self.active_files()).into_iter().collect();
        let mut report = CleanupReport::default();

        for path in files {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed temp file");
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), "Failed to remove temp file: {}", e);
                    report.failed += 1;
                }
            }
        }

        report.dir_removed = self.remove_dir_if_empty().await;
        info!(
            removed = report.removed,
            failed = report.failed,
            dir_removed = report.dir_removed,
            "Temp files cleaned up"
        );
        report
    }

    async fn remove_dir_if_empty(&self) -> bool {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        match entries.next_entry().await {
            Ok(None) => {}
            Ok(Some(_)) => {
                debug!(dir = %self.dir.display(), "Temp directory not empty, keeping it");
                return false;
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), "Failed to read temp directory: {}", e);
                return false;
            }
        }

        match tokio::fs::remove_dir(&self.dir).await {
            Ok(()) => true,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Failed to remove temp directory: {}", e);
                false
            }
        }
    }
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// File stem for a topic: ASCII letters, digits and Hangul syllables kept,
/// everything else collapsed into single underscores, lowercased.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || is_hangul_syllable(c) {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}
