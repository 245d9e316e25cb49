//! Conversation state — the ordered turn history for one chat session.
//!
//! Append-only in normal operation; the orchestrator truncates back to a
//! remembered length only on the defined failure paths (blocked or empty
//! model responses), so failed turns never leave orphaned entries behind.
//! Owned by exactly one `ChatSession` — never shared across sessions.

use crate::backend::Turn;

/// Ordered turn history.
#[derive(Debug, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Roll history back to a previously observed length.
    pub fn rollback_to(&mut self, len: usize) {
        if len < self.turns.len() {
            tracing::debug!(
                from = self.turns.len(),
                to = len,
                "rolling back conversation history"
            );
            self.turns.truncate(len);
        }
    }

    pub fn clear(&mut self) {
        tracing::info!("conversation history cleared");
        self.turns.clear();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
