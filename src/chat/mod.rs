//! Chat orchestration — the model/tool turn loop and its entry points.
//!
//! Submodules:
//! - `conversation`: ordered, append-only turn history with rollback
//! - `session`: the per-conversation orchestrator driving both paradigms
//! - `submission`: the cross-thread command channel into a session

pub mod conversation;
pub mod session;
pub mod submission;

#[cfg(test)]
pub mod testing;

// Re-exports for convenience
pub use conversation::ConversationState;
pub use session::{ChatReply, ChatSession, TurnStatus, DEFAULT_MAX_TOOL_ROUNDS};
pub use submission::{
    spawn_session, ChatError, SessionCommand, SessionHandle, DEFAULT_SUBMIT_WAIT,
};
