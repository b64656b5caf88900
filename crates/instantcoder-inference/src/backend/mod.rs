//! Pluggable model backend abstraction
//!
//! This module provides a trait-based abstraction over the hosted and local
//! services that generate code. All backends implement the same interface,
//! so the generation pipeline never knows which service it is talking to.

pub mod registry;
pub mod sse;

#[cfg(feature = "backend-gemini")]
pub mod gemini;

#[cfg(feature = "backend-openai")]
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

#[cfg(feature = "backend-gemini")]
pub use gemini::GeminiBackend;

#[cfg(feature = "backend-openai")]
pub use openai::OpenAiCompatBackend;

pub use registry::{BackendFactory, BackendRegistry};

/// Error types for backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend not ready: {0}")]
    NotReady(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed stream payload: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

/// Backend information for UI display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Backend identifier (e.g., "Gemini", "OpenAI-compatible")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Whether the backend needs an API key
    pub requires_api_key: bool,
    /// Base URL used when none is configured
    pub default_base_url: String,
}

/// Configuration for constructing a backend
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// API key (Gemini, hosted OpenAI-compatible services)
    pub api_key: Option<String>,
    /// Override of the service base URL
    pub base_url: Option<String>,
}

/// Raw generated text, chunked as it arrives from the service.
///
/// Chunk boundaries are arbitrary and may split multi-byte characters.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, BackendError>> + Send>>;

/// The core trait that all model backends must implement.
///
/// A backend is an opaque `invoke(model_id, messages)` capability: it either
/// opens a stream of generated text or fails before any text is produced.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human-readable name for UI display
    fn name(&self) -> &'static str;

    /// Base URL of the service this backend talks to
    fn base_url(&self) -> &str;

    /// Health check - verify the service is reachable
    async fn health_check(&self) -> bool;

    /// Open a streamed chat completion for `model_id` over `messages`
    async fn stream_chat(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ByteStream, BackendError>;
}
