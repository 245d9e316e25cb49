//! Tool-server client error types.

use thiserror::Error;

/// Errors that can occur while managing tool-server connections.
#[derive(Debug, Error)]
pub enum McpError {
    /// A connection with this identifier is already registered.
    #[error("server '{identifier}' is already connected")]
    AlreadyConnected { identifier: String },

    /// Connecting failed before the server was fully registered.
    ///
    /// Covers spawn failures, the initialize handshake, and tool discovery.
    /// Partially acquired resources are released before this is returned.
    #[error("failed to connect to server '{identifier}': {reason}")]
    ConnectFailed { identifier: String, reason: String },

    /// No connection registered under this identifier.
    #[error("server '{identifier}' is not connected")]
    NotFound { identifier: String },

    /// JSON-RPC communication error (malformed message, I/O error,
    /// closed pipe).
    #[error("transport error for server '{identifier}': {reason}")]
    Transport { identifier: String, reason: String },

    /// The server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    Server { code: i32, message: String },

    /// A request to the server did not complete in time.
    #[error("'{operation}' on server '{identifier}' timed out after {seconds}s")]
    Timeout {
        identifier: String,
        operation: String,
        seconds: u64,
    },
}
