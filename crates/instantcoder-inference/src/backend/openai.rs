//! OpenAI-compatible backend implementation
//!
//! Talks to any server exposing `/v1/chat/completions` with SSE streaming:
//! Ollama, llama.cpp's `llama-server`, vLLM, or a hosted OpenAI-style API.

use async_trait::async_trait;
use serde::Serialize;

use super::sse::{self, SsePayload};
use super::{BackendError, ByteStream, ModelBackend};
use crate::types::ChatMessage;

/// Default base URL (local Ollama daemon)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Backend for OpenAI-compatible chat completion servers
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    /// Base URL of the server (without `/v1`)
    base_url: String,
    /// Bearer token, if the server requires one
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    /// Create a new backend pointing at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Pull the delta text out of one SSE payload
    fn extract_delta(data: &str) -> Result<SsePayload, BackendError> {
        if data == "[DONE]" {
            return Ok(SsePayload::Done);
        }

        let json: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| BackendError::Protocol(format!("Invalid completion chunk: {}", e)))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(BackendError::Interrupted(message.to_string()));
        }

        match json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|c| c.as_str())
        {
            Some(content) => Ok(SsePayload::Text(content.to_string())),
            None => Ok(SsePayload::Skip),
        }
    }
}

impl Default for OpenAiCompatBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &'static str {
        "OpenAI-compatible"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.authorize(self.http_client.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn stream_chat(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ByteStream, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: model_id,
            messages,
            stream: true,
        };

        log::debug!(
            "Sending {} messages to {} (model '{}')",
            request.messages.len(),
            url,
            model_id
        );

        let response = self
            .authorize(self.http_client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(sse::text_stream(
            sse::response_bytes(response),
            Self::extract_delta,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        let backend = OpenAiCompatBackend::default();
        assert_eq!(backend.name(), "OpenAI-compatible");
        assert_eq!(backend.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OpenAiCompatBackend::new("http://localhost:8080/");
        assert_eq!(backend.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_request_shape() {
        let request = ChatCompletionRequest {
            model: "qwen2.5-coder",
            messages: vec![ChatMessage::user("hi")],
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_extract_delta() {
        let chunk = r#"{"id":"1","choices":[{"delta":{"content":"export"},"finish_reason":null}]}"#;
        assert_eq!(
            OpenAiCompatBackend::extract_delta(chunk).unwrap(),
            SsePayload::Text("export".to_string())
        );

        let role_only = r#"{"id":"1","choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(OpenAiCompatBackend::extract_delta(role_only).unwrap(), SsePayload::Skip);

        assert_eq!(OpenAiCompatBackend::extract_delta("[DONE]").unwrap(), SsePayload::Done);
    }

    #[test]
    fn test_extract_delta_error_payload() {
        let chunk = r#"{"error":{"message":"model not found"}}"#;
        assert!(matches!(
            OpenAiCompatBackend::extract_delta(chunk),
            Err(BackendError::Interrupted(_))
        ));
    }
}
