//! The completion-service seam.
//!
//! `CompletionBackend` is the orchestrator's only view of a model backend:
//! one call, full ordered history in, a normalized `ModelReply` out. The
//! production implementation is the HTTP client in `http.rs`; tests script
//! replies directly. No retry lives behind this trait — retry policy, if
//! any, belongs to the implementation's collaborators.

use async_trait::async_trait;

use super::declarations::FunctionDeclaration;
use super::errors::BackendError;
use super::types::{ModelReply, ToolParadigm, Turn};

/// One completion request: history plus whatever the paradigm advertises.
pub struct CompletionRequest<'a> {
    /// System-level text (the generic paradigm's tool catalogue rides here).
    pub system: Option<&'a str>,
    /// Full ordered conversation history.
    pub history: &'a [Turn],
    /// Structured declarations; `None` for the generic paradigm or when no
    /// tools are registered.
    pub declarations: Option<&'a [FunctionDeclaration]>,
}

/// A model backend able to answer completion requests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Which tool-calling convention this backend speaks. Fixed for the
    /// lifetime of the backend — the orchestrator selects its protocol once.
    fn paradigm(&self) -> ToolParadigm;

    /// Run one completion. Blocked and empty responses are `Ok` replies,
    /// not errors.
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<ModelReply, BackendError>;
}
