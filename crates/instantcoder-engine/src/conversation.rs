//! Conversation history
//!
//! The store is an append-only log of turns shared between the controller
//! (its only writer) and any number of readers. Writes are copy-on-write:
//! a [`Conversation`] snapshot is never affected by later writes.

use std::ops::Deref;
use std::sync::Arc;

use instantcoder_inference::{ChatMessage, Role};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, Serializer};

/// One role-tagged message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        ChatMessage::new(turn.role, turn.content.clone())
    }
}

/// Immutable ordered view of a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Arc<Vec<Turn>>,
}

impl Conversation {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Arc::new(turns),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Content of the last assistant turn
    pub fn last_artifact(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.content.as_str())
    }
}

impl Deref for Conversation {
    type Target = [Turn];

    fn deref(&self) -> &Self::Target {
        &self.turns
    }
}

impl Serialize for Conversation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.turns.iter())
    }
}

/// Shared, append-only turn log
#[derive(Debug, Default)]
pub struct ConversationStore {
    turns: RwLock<Arc<Vec<Turn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a turn at the end
    pub fn append(&self, turn: Turn) {
        let mut guard = self.turns.write();
        Arc::make_mut(&mut guard).push(turn);
    }

    /// Add several turns at the end in one write
    pub fn extend(&self, turns: impl IntoIterator<Item = Turn>) {
        let mut guard = self.turns.write();
        Arc::make_mut(&mut guard).extend(turns);
    }

    /// Discard all history and start over with `turns`
    pub fn replace_all(&self, turns: Vec<Turn>) {
        *self.turns.write() = Arc::new(turns);
    }

    /// Immutable copy of the current history
    pub fn snapshot(&self) -> Conversation {
        Conversation {
            turns: Arc::clone(&self.turns.read()),
        }
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }
}
