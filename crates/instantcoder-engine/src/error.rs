//! Error types for the generation pipeline

use instantcoder_inference::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Status;

/// Result type alias using GenerationError
pub type Result<T> = std::result::Result<T, GenerationError>;

/// A model stream that ended abnormally.
///
/// Carries whatever raw text had been decoded before the failure; that text
/// is never treated as a finished artifact.
#[derive(Debug, Clone, Error)]
pub enum StreamFailure {
    /// The transport errored mid-stream
    #[error("Stream failed after {} bytes: {message}", .partial.len())]
    Transport { message: String, partial: String },

    /// The stream produced bytes that are not valid UTF-8
    #[error("Stream produced malformed UTF-8 after {} bytes", .partial.len())]
    Decode { partial: String },
}

impl StreamFailure {
    /// Text accumulated before the failure
    pub fn partial(&self) -> &str {
        match self {
            StreamFailure::Transport { partial, .. } | StreamFailure::Decode { partial } => partial,
        }
    }
}

/// Coarse classification of a failed submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Rejected before any state change or model call
    Validation,
    /// The model call could not start or its stream broke
    Transport,
    /// The stream could not be decoded
    Decode,
}

/// Errors that can occur while submitting or running a generation cycle
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Create submitted with an empty intent
    #[error("Describe the app to generate: intent is empty")]
    EmptyIntent,

    /// Modify submitted with an empty instruction
    #[error("Modification instruction is empty")]
    EmptyModification,

    /// Modify submitted before any artifact was committed
    #[error("Nothing to modify: no generated code yet")]
    NothingToModify,

    /// A cycle is already in flight
    #[error("A generation is already in progress (status: {0})")]
    Busy(Status),

    /// The model call could not be started
    #[error("Model invocation failed: {0}")]
    Invoke(#[from] BackendError),

    /// The model stream ended abnormally
    #[error(transparent)]
    Stream(#[from] StreamFailure),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::EmptyIntent
            | GenerationError::EmptyModification
            | GenerationError::NothingToModify
            | GenerationError::Busy(_) => FailureKind::Validation,
            GenerationError::Invoke(_) | GenerationError::Stream(StreamFailure::Transport { .. }) => {
                FailureKind::Transport
            }
            GenerationError::Stream(StreamFailure::Decode { .. }) => FailureKind::Decode,
        }
    }

    /// Whether the submission was rejected without touching any state
    pub fn is_validation(&self) -> bool {
        self.kind() == FailureKind::Validation
    }

    /// Raw text received before a stream failure, if any
    pub fn partial(&self) -> Option<&str> {
        match self {
            GenerationError::Stream(failure) => Some(failure.partial()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert!(GenerationError::EmptyIntent.is_validation());
        assert!(GenerationError::Busy(Status::Creating).is_validation());
        assert_eq!(
            GenerationError::Invoke(BackendError::Config("no key".into())).kind(),
            FailureKind::Transport
        );
        assert_eq!(
            GenerationError::from(StreamFailure::Decode { partial: String::new() }).kind(),
            FailureKind::Decode
        );
    }

    #[test]
    fn test_partial_carried() {
        let err = GenerationError::from(StreamFailure::Transport {
            message: "connection reset".into(),
            partial: "function App".into(),
        });
        assert_eq!(err.partial(), Some("function App"));
        assert!(err.to_string().contains("connection reset"));
    }
}
