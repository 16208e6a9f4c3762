//! Conversation state for multi-turn sessions.
//!
//! An ordered, append-only turn history scoped to one session. The state
//! is an explicit value passed into the retrieval chain, never ambient
//! global state, and it is not durable across process restarts.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered turn history for one active session.
#[derive(Debug, Clone)]
pub struct ConversationState {
    session_id: Uuid,
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    /// Start a fresh session with an empty history.
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Append a turn. Pure in-memory append; cannot fail.
    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `n` turns in original order, or fewer if the history is
    /// shorter. Never errors for `n` exceeding the length.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Clear the history for a new session.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
