// Session state machine
// Conversation history plus the KV-cache cursor, for stateful multi-turn
// chat. Invariant: the cursor is zero exactly when the history is empty.

use crate::backend::ChatMessage;

/// Conversation state shared between turns in stateful mode.
///
/// Stateless turns never read or write this; they behave as if starting from
/// an empty session regardless of what is stored here.
#[derive(Debug, Default)]
pub struct Session {
    history: Vec<ChatMessage>,
    cursor: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full conversation history, oldest first. Append-only; entries are
    /// never mutated in place.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Count of token positions already evaluated into the attention cache.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of complete turns (user + assistant pairs).
    pub fn turn_count(&self) -> usize {
        self.history.len() / 2
    }

    pub fn push_user(&mut self, content: String) {
        self.history.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: String) {
        self.history.push(ChatMessage::assistant(content));
    }

    /// Advance the cursor after evaluation. Monotonic within a session.
    pub fn set_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor >= self.cursor);
        self.cursor = cursor;
    }

    /// Reset to the READY state: empty history, cursor zero. The caller is
    /// responsible for clearing the backend's cache alongside this.
    pub fn clear(&mut self) {
        self.history.clear();
        self.cursor = 0;
    }
}
