//! Completion-backend bridge — declarations, paradigms, and the model seam.
//!
//! Submodules:
//! - `types`: conversation turns, tool-call requests, normalized replies
//! - `declarations`: schema translation + per-paradigm memoized cache
//! - `client`: the `CompletionBackend` trait the orchestrator consumes
//! - `http`: OpenAI-compatible HTTP implementation
//! - `parser`: generic-paradigm tool-call sniffing
//! - `errors`: backend error types

pub mod client;
pub mod declarations;
pub mod errors;
pub mod http;
pub mod parser;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionBackend, CompletionRequest};
pub use declarations::{DeclarationCache, FunctionDeclaration, ParamType};
pub use errors::BackendError;
pub use http::HttpBackend;
pub use types::{
    ModelReply, ToolCallRequest, ToolParadigm, ToolResultRecord, Turn, TurnRole,
};
