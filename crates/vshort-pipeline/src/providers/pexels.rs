//! Pexels video search client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use vshort_models::{MediaCandidate, MediaFileVariant};

use super::{check_status, http_client, send_error, SearchProvider, SearchQuery};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;

const SERVICE: &str = "pexels";

pub struct PexelsClient {
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    user: Option<PexelsUser>,
    #[serde(default)]
    video_files: Vec<PexelsVideoFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsUser {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideoFile {
    link: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    file_type: Option<String>,
}

impl From<PexelsVideo> for MediaCandidate {
    fn from(video: PexelsVideo) -> Self {
        MediaCandidate {
            id: video.id.to_string(),
            duration_secs: video.duration,
            width: video.width,
            height: video.height,
            image: video.image,
            files: video
                .video_files
                .into_iter()
                .map(|file| MediaFileVariant {
                    link: file.link,
                    width: file.width,
                    height: file.height,
                    file_type: file.file_type.unwrap_or_default(),
                })
                .collect(),
            author: video.user.and_then(|user| user.name),
        }
    }
}

impl PexelsClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Self::with_endpoint(
            &config.pexels_api_key,
            &config.pexels_search_url,
            config.request_timeout,
        )
    }

    pub fn with_endpoint(api_key: &str, url: &str, timeout: Duration) -> PipelineResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for PexelsClient {
    async fn search(&self, query: &SearchQuery) -> PipelineResult<Vec<MediaCandidate>> {
        debug!(query = %query.query, page = query.page, "Searching Pexels");

        let response = self
            .client
            .get(&self.url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query.query.as_str()),
                ("per_page", &query.per_page.to_string()),
                ("page", &query.page.to_string()),
                ("orientation", query.orientation.as_str()),
                ("size", "large"),
            ])
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let parsed: SearchResponse = response.json().await.map_err(|e| send_error(SERVICE, e))?;
        Ok(parsed.videos.into_iter().map(MediaCandidate::from).collect())
    }
}
