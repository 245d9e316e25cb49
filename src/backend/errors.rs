//! Completion-backend error types.

use thiserror::Error;

/// Errors from the completion-service bridge.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend is missing an endpoint, model, or API key.
    #[error("backend not configured: {reason}")]
    NotConfigured { reason: String },

    /// The HTTP round trip to the completion service failed.
    #[error("completion request failed: {reason}")]
    Http { reason: String },

    /// The service answered with something that does not parse as a
    /// completion response.
    #[error("invalid completion response: {reason}")]
    InvalidResponse { reason: String },
}
