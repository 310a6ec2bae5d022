//! Anthropic messages API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, send_error, GenerationProvider, GenerationRequest};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "claude";
const API_VERSION: &str = "2023-06-01";

/// Claude client used for topic suggestions and scripts.
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl ClaudeClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Self::with_endpoint(
            &config.claude_api_key,
            &config.claude_url,
            &config.claude_model,
            config.request_timeout,
        )
    }

    pub fn with_endpoint(
        api_key: &str,
        url: &str,
        model: &str,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.to_string(),
            url: url.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl GenerationProvider for ClaudeClient {
    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        debug!(model = %self.model, max_tokens = request.max_tokens, "Calling Claude");

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| send_error(SERVICE, e))?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| PipelineError::invalid_response(SERVICE, "no text content"))?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ClaudeClient {
        ClaudeClient::with_endpoint(
            "test-key",
            &format!("{}/v1/messages", server.uri()),
            "claude-test",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-test",
                "max_tokens": 2048,
                "messages": [{"role": "user", "content": "Write a script"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "  First. Second.  \n"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server)
            .await
            .generate(&GenerationRequest::new("Write a script").with_max_tokens(2048))
            .await
            .unwrap();
        assert_eq!(text, "First. Second.");
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_empty_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidResponse { .. }));
    }
}
