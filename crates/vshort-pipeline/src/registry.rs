//! Persistent record of stock footage already used in a video.
//!
//! The store is a single pretty-printed JSON object mapping a resource id to
//! the contexts it was used for. Every mark rewrites the whole document.
//! Marks are never removed.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PipelineResult;

/// Resource id to usage contexts.
pub type UsageRecord = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub struct UsedResourceRegistry {
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl UsedResourceRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `resource_id` was ever marked.
    pub async fn is_used(&self, resource_id: &str) -> PipelineResult<bool> {
        Ok(self.load().await?.contains_key(resource_id))
    }

    /// Contexts recorded for `resource_id`.
    pub async fn usages(&self, resource_id: &str) -> PipelineResult<Vec<String>> {
        Ok(self.load().await?.remove(resource_id).unwrap_or_default())
    }

    /// Append `context` to the usages of `resource_id` and persist the store.
    /// The write is flushed to disk before this returns.
    pub async fn mark_used(&self, resource_id: &str, context: &str) -> PipelineResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load().await?;
        record
            .entry(resource_id.to_string())
            .or_default()
            .push(context.to_string());
        self.persist(&record).await?;

        info!(resource_id, context, "Marked resource as used");
        Ok(())
    }

    /// Mark `resource_id` unless it is already used, in one locked cycle.
    ///
    /// Returns `false` when another caller got there first.
    pub async fn claim(&self, resource_id: &str, context: &str) -> PipelineResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load().await?;
        if record.contains_key(resource_id) {
            return Ok(false);
        }
        record.insert(resource_id.to_string(), vec![context.to_string()]);
        self.persist(&record).await?;

        info!(resource_id, context, "Claimed resource");
        Ok(true)
    }

    /// Load the full store. A missing file is an empty store.
    pub async fn load(&self) -> PipelineResult<UsageRecord> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(UsageRecord::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No usage record yet");
                Ok(UsageRecord::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, record: &UsageRecord) -> PipelineResult<()> {
        let json = serde_json::to_vec_pretty(record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
