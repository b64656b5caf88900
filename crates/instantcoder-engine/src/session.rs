//! Generation lifecycle types
//!
//! A [`GenerationSession`] is the live state of one request/response cycle.
//! It is replaced when the next submission begins and never outlives it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::Conversation;

/// Lifecycle status of a controller.
///
/// `Created` and `Updated` are the same stable state for transition
/// purposes; they differ only for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Initial,
    Creating,
    Created,
    Updating,
    Updated,
}

impl Status {
    /// A cycle is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Creating | Status::Updating)
    }

    /// A committed artifact exists and can be modified
    pub fn has_artifact(&self) -> bool {
        matches!(self, Status::Created | Status::Updated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Initial => "initial",
            Status::Creating => "creating",
            Status::Created => "created",
            Status::Updating => "updating",
            Status::Updated => "updated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Generate a brand-new artifact, discarding history on success
    Create,
    /// Apply a change to the last committed artifact
    Modify,
}

impl Mode {
    /// Status while a cycle of this mode is in flight
    pub fn busy_status(&self) -> Status {
        match self {
            Mode::Create => Status::Creating,
            Mode::Modify => Status::Updating,
        }
    }

    /// Status after a cycle of this mode completes
    pub fn done_status(&self) -> Status {
        match self {
            Mode::Create => Status::Created,
            Mode::Modify => Status::Updated,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Mode::Create),
            "modify" => Ok(Mode::Modify),
            other => Err(format!("Invalid mode '{}': expected 'create' or 'modify'", other)),
        }
    }
}

/// A user action entering the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Raw intent (create) or modification instruction (modify)
    pub intent: String,
    pub mode: Mode,
    /// Model for a create; ignored by modify, which reuses the model of the last create
    #[serde(default)]
    pub model_id: Option<String>,
}

impl Submission {
    pub fn create(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            mode: Mode::Create,
            model_id: None,
        }
    }

    pub fn modify(instruction: impl Into<String>) -> Self {
        Self {
            intent: instruction.into(),
            mode: Mode::Modify,
            model_id: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }
}

/// Everything one model call needs, built fresh per submission
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub target_model_id: String,
    pub history: Conversation,
    pub raw_intent: String,
    pub mode: Mode,
}

/// Live state of the current cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSession {
    pub id: Uuid,
    /// `None` until the first submission
    pub mode: Option<Mode>,
    pub status: Status,
    /// Latest sanitized text of the in-flight stream
    pub partial_artifact: String,
    /// Last successfully completed artifact
    pub committed_artifact: Option<String>,
    /// Error surfaced by the last failed cycle
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl GenerationSession {
    /// The session of a controller that has never been submitted to
    pub fn idle() -> Self {
        Self {
            id: Uuid::new_v4(),
            mode: None,
            status: Status::Initial,
            partial_artifact: String::new(),
            committed_artifact: None,
            error: None,
            started_at: Utc::now(),
        }
    }

    /// Start a new cycle, carrying over the last committed artifact
    pub fn begin(mode: Mode, committed_artifact: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode: Some(mode),
            status: mode.busy_status(),
            partial_artifact: String::new(),
            committed_artifact,
            error: None,
            started_at: Utc::now(),
        }
    }

    /// The artifact a display should show right now
    pub fn display_artifact(&self) -> &str {
        if self.status.is_busy() && !self.partial_artifact.is_empty() {
            &self.partial_artifact
        } else {
            self.committed_artifact.as_deref().unwrap_or("")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(Status::Creating.is_busy());
        assert!(Status::Updating.is_busy());
        assert!(!Status::Initial.is_busy());
        assert!(Status::Created.has_artifact());
        assert!(Status::Updated.has_artifact());
        assert!(!Status::Initial.has_artifact());
    }

    #[test]
    fn test_mode_serde_and_parse() {
        assert_eq!(serde_json::to_string(&Mode::Modify).unwrap(), r#""modify""#);
        assert_eq!("create".parse::<Mode>(), Ok(Mode::Create));
        assert!("rewrite".parse::<Mode>().is_err());
    }

    #[test]
    fn test_begin_keeps_committed_artifact() {
        let session = GenerationSession::begin(Mode::Modify, Some("old".to_string()));
        assert_eq!(session.status, Status::Updating);
        assert!(session.partial_artifact.is_empty());
        assert_eq!(session.display_artifact(), "old");
    }

    #[test]
    fn test_submission_deserializes_without_model() {
        let submission: Submission =
            serde_json::from_str(r#"{"intent":"add a dark mode toggle","mode":"modify"}"#).unwrap();
        assert_eq!(submission, Submission::modify("add a dark mode toggle"));
    }
}
