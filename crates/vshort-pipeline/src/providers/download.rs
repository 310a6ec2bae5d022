//! Streaming footage downloader.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{check_status, send_error, MediaFetcher};
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "download";

/// Downloads footage to disk under an overall time budget.
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> PipelineResult<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            timeout,
        })
    }

    async fn fetch(&self, url: &str, output: &Path) -> PipelineResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::File::create(output).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| send_error(SERVICE, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl MediaFetcher for HttpDownloader {
    async fn download(&self, url: &str, output: &Path) -> PipelineResult<PathBuf> {
        let result = match tokio::time::timeout(self.timeout, self.fetch(url, output)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(format!(
                "download exceeded {}s",
                self.timeout.as_secs()
            ))),
        };

        match result {
            Ok(0) => {
                remove_partial(output).await;
                Err(PipelineError::invalid_response(SERVICE, "empty body"))
            }
            Ok(bytes) => {
                debug!(url, bytes, output = %output.display(), "Download complete");
                Ok(output.to_path_buf())
            }
            Err(e) => {
                remove_partial(output).await;
                Err(e)
            }
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove partial download: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("video_0.mp4");
        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();

        let written = downloader
            .download(&format!("{}/clip.mp4", server.uri()), &output)
            .await
            .unwrap();
        assert_eq!(written, output);
        assert_eq!(std::fs::metadata(&output).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video_1.mp4");
        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();

        let err = downloader
            .download(&format!("{}/missing.mp4", server.uri()), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport { status: 404, .. }));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_download_timeout_removes_partial() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video_2.mp4");
        let downloader = HttpDownloader::new(Duration::from_millis(200)).unwrap();

        let err = downloader
            .download(&format!("{}/slow.mp4", server.uri()), &output)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("video_3.mp4");
        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();

        let err = downloader.download(&server.uri(), &output).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidResponse { .. }));
        assert!(!output.exists());
    }
}
