//! Streaming model-invocation library
//!
//! This library provides a unified interface for the generative-text services
//! InstantCoder drives:
//! - **Gemini**: Google's Generative Language REST API (default)
//! - **OpenAI-compatible**: any `/v1/chat/completions` server (Ollama, llama.cpp, vLLM)
//!
//! Every backend answers a chat request with a raw byte stream of generated
//! text. Decoding and post-processing are left to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use instantcoder_inference::{BackendConfig, BackendRegistry, ChatMessage};
//!
//! let registry = BackendRegistry::new();
//! let backend = registry.create("Gemini", &BackendConfig {
//!     api_key: Some(std::env::var("GOOGLE_AI_API_KEY")?),
//!     ..Default::default()
//! })?;
//!
//! let stream = backend
//!     .stream_chat("gemini-2.0-flash-exp", vec![ChatMessage::user("Build me a calculator app")])
//!     .await?;
//! ```

pub mod backend;
pub mod types;

// Re-exports for convenience
pub use backend::{
    BackendConfig, BackendError, BackendFactory, BackendInfo, BackendRegistry, ByteStream,
    ModelBackend,
};

#[cfg(feature = "backend-gemini")]
pub use backend::GeminiBackend;

#[cfg(feature = "backend-openai")]
pub use backend::OpenAiCompatBackend;

pub use types::{default_model_options, ChatMessage, ModelOption, ParseRoleError, Role};
