//! OpenAI chat completions and speech synthesis clients.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_status, http_client, send_error, GenerationProvider, GenerationRequest, SpeechProvider,
};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};

const CHAT_SERVICE: &str = "openai";
const SPEECH_SERVICE: &str = "openai-tts";

pub const SPEECH_MODEL: &str = "tts-1";
pub const SPEECH_VOICE: &str = "nova";
pub const SPEECH_FORMAT: &str = "aac";
/// Longest input the speech endpoint accepts, in characters.
pub const SPEECH_MAX_CHARS: usize = 4000;

/// Chat completions client used for keyword extraction.
pub struct OpenAiChatClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Self::with_endpoint(
            &config.openai_api_key,
            &config.openai_chat_url,
            &config.openai_model,
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
impl GenerationProvider for OpenAiChatClient {
    async fn generate(&self, request: &GenerationRequest) -> PipelineResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages,
        };

        debug!(model = %self.model, "Calling OpenAI chat");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(CHAT_SERVICE, e))?;
        let response = check_status(CHAT_SERVICE, response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| send_error(CHAT_SERVICE, e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PipelineError::invalid_response(CHAT_SERVICE, "no message content"))
    }
}

/// Speech synthesis client producing AAC narration.
pub struct OpenAiSpeechClient {
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiSpeechClient {
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        Self::with_endpoint(
            &config.openai_api_key,
            &config.openai_speech_url,
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

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[async_trait]
impl SpeechProvider for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str, output: &Path) -> PipelineResult<PathBuf> {
        let input = truncate_chars(text.trim(), SPEECH_MAX_CHARS);
        if input.is_empty() {
            return Err(PipelineError::task_failed("cannot synthesize empty text"));
        }

        let body = SpeechRequest {
            model: SPEECH_MODEL,
            voice: SPEECH_VOICE,
            input,
            response_format: SPEECH_FORMAT,
        };

        debug!(chars = input.chars().count(), output = %output.display(), "Synthesizing speech");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(SPEECH_SERVICE, e))?;
        let response = check_status(SPEECH_SERVICE, response).await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| send_error(SPEECH_SERVICE, e))?;
        if audio.is_empty() {
            return Err(PipelineError::invalid_response(SPEECH_SERVICE, "empty audio body"));
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(output, &audio).await?;

        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("안녕하세요", 2), "안녕");
    }

    #[tokio::test]
    async fn test_chat_sends_system_and_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [
                    {"role": "system", "content": "extract keywords"},
                    {"role": "user", "content": "The sun rises."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " sunrise, morning sky "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiChatClient::with_endpoint(
            "sk-test",
            &format!("{}/v1/chat/completions", server.uri()),
            "gpt-test",
            Duration::from_secs(5),
        )
        .unwrap();

        let request = GenerationRequest::new("The sun rises.").with_system("extract keywords");
        let content = client.generate(&request).await.unwrap();
        assert_eq!(content, "sunrise, morning sky");
    }

    #[tokio::test]
    async fn test_chat_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::with_endpoint(
            "sk-test",
            &server.uri(),
            "gpt-test",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_chat_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::with_endpoint(
            "sk-test",
            &server.uri(),
            "gpt-test",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.generate(&GenerationRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Transport { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_synthesize_writes_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(body_partial_json(json!({
                "model": "tts-1",
                "voice": "nova",
                "response_format": "aac",
                "input": "Hello there."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFFu8, 0xF1, 0x50, 0x80]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("audio_0.aac");
        let client = OpenAiSpeechClient::with_endpoint(
            "sk-test",
            &format!("{}/v1/audio/speech", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        let written = client.synthesize("  Hello there. ", &output).await.unwrap();
        assert_eq!(written, output);
        assert_eq!(std::fs::read(&output).unwrap(), vec![0xFF, 0xF1, 0x50, 0x80]);
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_text() {
        let client = OpenAiSpeechClient::with_endpoint(
            "sk-test",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = client
            .synthesize("   ", &dir.path().join("a.aac"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TaskFailed(_)));
    }
}
