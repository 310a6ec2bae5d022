//! Remote collaborators: text generation, footage search, speech and download.
//!
//! Each concern is a trait so planning and production can run against fakes;
//! the submodules hold the HTTP implementations.

pub mod claude;
pub mod download;
pub mod openai;
pub mod pexels;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use vshort_models::{MediaCandidate, Orientation};

use crate::error::{PipelineError, PipelineResult};

pub use claude::ClaudeClient;
pub use download::HttpDownloader;
pub use openai::{OpenAiChatClient, OpenAiSpeechClient};
pub use pexels::PexelsClient;

/// Results per search page.
pub const SEARCH_PAGE_SIZE: u32 = 15;

/// Prompt for a text generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Footage search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub page: u32,
    pub per_page: u32,
    pub orientation: Orientation,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, page: u32, orientation: Orientation) -> Self {
        Self {
            query: query.into(),
            page: page.max(1),
            per_page: SEARCH_PAGE_SIZE,
            orientation,
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<String>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> PipelineResult<Vec<MediaCandidate>>;
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize `text` into an audio file at `output`.
    async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<PathBuf>;
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` to `output`. A partial file is removed on failure.
    async fn download(&self, url: &str, output: &Path) -> PipelineResult<PathBuf>;
}

/// HTTP client with a per-request budget.
pub(crate) fn http_client(timeout: Duration) -> PipelineResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Timeouts surface as [`PipelineError::Timeout`].
pub(crate) fn send_error(service: &str, error: reqwest::Error) -> PipelineError {
    if error.is_timeout() {
        PipelineError::Timeout(format!("{} request timed out", service))
    } else {
        PipelineError::Http(error)
    }
}

/// Pass successful responses through, classify the rest by status.
pub(crate) async fn check_status(service: &str, response: Response) -> PipelineResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::from_http_status(service, status.as_u16(), body))
}
