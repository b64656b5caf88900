//! Gemini backend implementation
//!
//! Calls the Generative Language REST API directly. Requests go to
//! `streamGenerateContent` with `alt=sse`, so generated text arrives as a
//! server-sent event stream of partial `GenerateContentResponse` objects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reqwest::Url;

use super::sse::{self, SsePayload};
use super::{BackendError, ByteStream, ModelBackend};
use crate::types::{ChatMessage, Role};

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default Generative Language API endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend using the hosted REST API
#[derive(Clone)]
pub struct GeminiBackend {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    /// API key sent in the `x-goog-api-key` header
    api_key: String,
    /// Base URL of the API
    base_url: String,
}

impl GeminiBackend {
    /// Create a new Gemini backend with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (proxies, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `streamGenerateContent` URL for `model_id`, escaped as one path segment
    fn endpoint(&self, model_id: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            BackendError::Config(format!("Invalid Gemini base URL '{}': {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                BackendError::Config(format!("Gemini base URL '{}' cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:streamGenerateContent", model_id));
        Ok(url)
    }

    fn build_request(messages: Vec<ChatMessage>) -> GenerateContentRequest {
        let contents = messages
            .into_iter()
            .map(|msg| Content {
                role: match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_string(),
                parts: vec![Part { text: msg.content }],
            })
            .collect();

        GenerateContentRequest { contents }
    }

    /// Pull the generated text out of one SSE payload
    fn extract_text(data: &str) -> Result<SsePayload, BackendError> {
        let response: GenerateContentResponse = serde_json::from_str(data)
            .map_err(|e| BackendError::Protocol(format!("Invalid Gemini chunk: {}", e)))?;

        if let Some(error) = response.error {
            return Err(BackendError::Api {
                status: error.code.unwrap_or(500),
                body: error.message.unwrap_or_default(),
            });
        }

        if let Some(reason) = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(BackendError::Api {
                status: 400,
                body: format!("Prompt blocked: {}", reason),
            });
        }

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            Ok(SsePayload::Skip)
        } else {
            Ok(SsePayload::Text(text))
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self
            .http_client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn stream_chat(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ByteStream, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Config("Gemini API key is not set".to_string()));
        }

        let url = self.endpoint(model_id)?;
        let body = Self::build_request(messages);

        log::debug!(
            "Sending {} messages to Gemini model '{}'",
            body.contents.len(),
            model_id
        );

        let response = self
            .http_client
            .post(url)
            .query(&[("alt", "sse")])
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
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
            Self::extract_text,
        ))
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}
