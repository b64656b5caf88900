//! Event types for streaming generation progress
//!
//! Events are sent from the controller to any display layer (an SSE feed,
//! a test collector) to report cycle starts, partial artifacts, completion
//! and failure.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureKind;
use crate::session::{Mode, Status};

/// Trait for publishing generation events
///
/// This abstracts over the transport (broadcast channel, SSE, collector)
/// so the controller can be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., no listener)
    fn send(&self, event: GenerationEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    /// Nobody is listening on the other end
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a generation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GenerationEvent {
    /// A submission was accepted and the model is being called
    #[serde(rename_all = "camelCase")]
    CycleStarted {
        session_id: Uuid,
        mode: Mode,
        model_id: String,
    },

    /// Sanitized text received so far (complete string, not a delta)
    #[serde(rename_all = "camelCase")]
    Partial { session_id: Uuid, artifact: String },

    /// The cycle finished and its artifact was committed
    #[serde(rename_all = "camelCase")]
    Completed {
        session_id: Uuid,
        status: Status,
        artifact: String,
    },

    /// The cycle failed; `status` is the state the controller reverted to
    #[serde(rename_all = "camelCase")]
    Failed {
        session_id: Uuid,
        status: Status,
        kind: FailureKind,
        error: String,
    },
}

impl GenerationEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            GenerationEvent::CycleStarted { session_id, .. }
            | GenerationEvent::Partial { session_id, .. }
            | GenerationEvent::Completed { session_id, .. }
            | GenerationEvent::Failed { session_id, .. } => *session_id,
        }
    }

    /// Whether this event ends a cycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationEvent::Completed { .. } | GenerationEvent::Failed { .. }
        )
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GenerationEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<GenerationEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<GenerationEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GenerationEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        let session_id = Uuid::new_v4();

        sink.send(GenerationEvent::Partial {
            session_id,
            artifact: "export default".to_string(),
        })
        .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id(), session_id);
        assert!(!events[0].is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = GenerationEvent::Failed {
            session_id: Uuid::nil(),
            status: Status::Initial,
            kind: FailureKind::Transport,
            error: "connection reset".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["sessionId"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["status"], "initial");
        assert_eq!(json["kind"], "transport");
    }

    #[test]
    fn test_null_sink() {
        let sink = NullEventSink;
        sink.send(GenerationEvent::CycleStarted {
            session_id: Uuid::nil(),
            mode: Mode::Create,
            model_id: "gemini-2.0-flash-exp".to_string(),
        })
        .unwrap();
    }
}
