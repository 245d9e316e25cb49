//! toolbridge — tool-server orchestration and a multi-backend
//! function-calling bridge for desktop chat applications.
//!
//! The crate manages external tool-provider processes (spawn, registry,
//! health), translates their schemas into backend-specific declarations,
//! and drives the "model asks for a tool, tool runs, model is re-invoked"
//! loop for both native function-calling and text-convention backends.
//!
//! Entry points:
//! - [`chat::ChatSession`] — one conversation: connect servers, process
//!   queries, tear down.
//! - [`chat::spawn_session`] / [`chat::SessionHandle`] — the cross-thread
//!   front door for non-async callers (HTTP handlers, CLI threads).
//! - [`config::AppConfig`] — file-based configuration for servers and the
//!   completion backend.

pub mod backend;
pub mod chat;
pub mod config;
pub mod mcp_client;
pub mod store;

/// Return the platform-standard data directory for toolbridge.
///
/// Falls back to `~/.toolbridge/` when no platform dir can be resolved.
pub fn data_dir() -> std::path::PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("toolbridge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".toolbridge")
}

/// Initialize the tracing subscriber for embedding applications.
///
/// Respects `RUST_LOG`; defaults to `toolbridge=info,warn` otherwise.
/// Call once at startup — a second call is a no-op so tests and embedders
/// cannot trip over each other.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolbridge=info,warn"));

    let _ = fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
