//! Conversational code-generation pipeline
//!
//! This crate turns a natural-language description of a UI component into
//! source code by driving a streamed model call, and keeps the conversation
//! so later instructions can refine the result.
//!
//! # Architecture
//!
//! - **MessageFormatter** ([`prompt`]): wraps raw intents with the system
//!   instructions and output directives
//! - **Sanitizer** ([`sanitize`]): strips Markdown fences from model output
//! - **ConversationStore** ([`conversation`]): append-only, snapshot-able
//!   turn log
//! - **StreamConsumer** ([`stream`]): decodes the byte stream and publishes
//!   sanitized partial artifacts
//! - **GenerationController** ([`controller`]): the lifecycle state machine
//!   tying everything together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use instantcoder_engine::{GenerationController, Submission};
//!
//! let controller = Arc::new(GenerationController::new(backend, "gemini-2.0-flash-exp"));
//! let code = controller.submit(Submission::create("Build me a calculator app")).await?;
//! let code = controller.submit(Submission::modify("add a dark mode toggle")).await?;
//! ```

pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod prompt;
pub mod sanitize;
pub mod session;
pub mod stream;

pub use controller::{GenerationController, PendingCycle};
pub use conversation::{Conversation, ConversationStore, Turn};
pub use error::{FailureKind, GenerationError, Result, StreamFailure};
pub use events::{EventError, EventSink, GenerationEvent, NullEventSink, VecEventSink};
pub use prompt::{MessageFormatter, SYSTEM_PROMPT, SYSTEM_PROMPT_VERSION};
pub use sanitize::{FenceSanitizer, Sanitizer};
pub use session::{GenerationRequest, GenerationSession, Mode, Status, Submission};
pub use stream::StreamConsumer;
