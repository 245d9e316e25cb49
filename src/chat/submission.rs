//! Cross-thread submission into the chat session.
//!
//! The session's state is mutated by exactly one task — the consumer loop
//! in [`run`]. Everything outside (an HTTP handler on a different thread
//! pool, a CLI thread) reaches the session through a `SessionHandle`:
//! commands go over a bounded channel, each carrying its own reply sender,
//! and the submitting thread waits with a bounded timeout. Exceeding that
//! wait is `SubmissionTimeout`, a recoverable per-request outcome — the
//! session keeps running and finishes the command; only the reply is
//! dropped.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mcp_client::{ConnectionSnapshot, LaunchSpec, McpError};

use super::session::{ChatReply, ChatSession};

/// Default bound on how long a submitting thread waits for its reply.
pub const DEFAULT_SUBMIT_WAIT: Duration = Duration::from_secs(60);

/// Depth of the command channel.
const COMMAND_QUEUE_DEPTH: usize = 32;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors crossing the thread boundary into the session.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The bounded wait for the session's reply expired. The command is
    /// still processed; only this caller gave up on the answer.
    #[error("request timed out after {waited_ms}ms waiting for the chat session")]
    SubmissionTimeout { waited_ms: u64 },

    /// The session task has exited; no further commands can be served.
    #[error("chat session is closed")]
    SessionClosed,
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Requests the consumer loop understands. Replies travel over plain std
/// channels so non-async threads can wait on them with a timeout.
pub enum SessionCommand {
    Chat {
        text: String,
        reply: std::sync::mpsc::Sender<ChatReply>,
    },
    Connect {
        identifier: String,
        spec: LaunchSpec,
        reply: std::sync::mpsc::Sender<Result<Vec<String>, McpError>>,
    },
    Disconnect {
        identifier: String,
        reply: std::sync::mpsc::Sender<Result<(), McpError>>,
    },
    ListConnections {
        reply: std::sync::mpsc::Sender<Vec<ConnectionSnapshot>>,
    },
    ClearHistory {
        reply: std::sync::mpsc::Sender<()>,
    },
    Shutdown {
        reply: std::sync::mpsc::Sender<Vec<(String, McpError)>>,
    },
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Thread-safe entry point to a running session.
///
/// Methods block the calling thread and must not be used from inside the
/// session's own runtime worker — they exist for foreign threads.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    fn submit<T>(
        &self,
        wait: Duration,
        build: impl FnOnce(std::sync::mpsc::Sender<T>) -> SessionCommand,
    ) -> Result<T, ChatError> {
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        self.tx
            .blocking_send(build(reply_tx))
            .map_err(|_| ChatError::SessionClosed)?;
        reply_rx.recv_timeout(wait).map_err(|e| match e {
            std::sync::mpsc::RecvTimeoutError::Timeout => ChatError::SubmissionTimeout {
                waited_ms: wait.as_millis() as u64,
            },
            std::sync::mpsc::RecvTimeoutError::Disconnected => ChatError::SessionClosed,
        })
    }

    /// Submit a chat message and wait up to `wait` for the reply.
    pub fn chat(&self, text: &str, wait: Duration) -> Result<ChatReply, ChatError> {
        self.submit(wait, |reply| SessionCommand::Chat {
            text: text.to_string(),
            reply,
        })
    }

    pub fn connect(
        &self,
        identifier: &str,
        spec: LaunchSpec,
        wait: Duration,
    ) -> Result<Result<Vec<String>, McpError>, ChatError> {
        self.submit(wait, |reply| SessionCommand::Connect {
            identifier: identifier.to_string(),
            spec,
            reply,
        })
    }

    pub fn disconnect(
        &self,
        identifier: &str,
        wait: Duration,
    ) -> Result<Result<(), McpError>, ChatError> {
        self.submit(wait, |reply| SessionCommand::Disconnect {
            identifier: identifier.to_string(),
            reply,
        })
    }

    pub fn list_connections(
        &self,
        wait: Duration,
    ) -> Result<Vec<ConnectionSnapshot>, ChatError> {
        self.submit(wait, |reply| SessionCommand::ListConnections { reply })
    }

    pub fn clear_history(&self, wait: Duration) -> Result<(), ChatError> {
        self.submit(wait, |reply| SessionCommand::ClearHistory { reply })
    }

    /// Tear the session down and wait for teardown to finish.
    pub fn shutdown(&self, wait: Duration) -> Result<Vec<(String, McpError)>, ChatError> {
        self.submit(wait, |reply| SessionCommand::Shutdown { reply })
    }
}

// ─── Consumer Loop ───────────────────────────────────────────────────────────

/// Spawn the session's consumer loop on the current runtime.
pub fn spawn_session(session: ChatSession) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let join = tokio::spawn(run(session, rx));
    (SessionHandle { tx }, join)
}

/// The single consumer: drains commands one at a time, making this task the
/// sole writer of registry, declarations, and history.
pub async fn run(mut session: ChatSession, mut rx: mpsc::Receiver<SessionCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            SessionCommand::Chat { text, reply } => {
                let result = session.process_query(&text).await;
                // A failed send means the submitter timed out — drop it.
                let _ = reply.send(result);
            }
            SessionCommand::Connect {
                identifier,
                spec,
                reply,
            } => {
                let _ = reply.send(session.connect_server(&identifier, spec).await);
            }
            SessionCommand::Disconnect { identifier, reply } => {
                let _ = reply.send(session.disconnect_server(&identifier).await);
            }
            SessionCommand::ListConnections { reply } => {
                let _ = reply.send(session.list_connections().await);
            }
            SessionCommand::ClearHistory { reply } => {
                session.clear_history();
                let _ = reply.send(());
            }
            SessionCommand::Shutdown { reply } => {
                let _ = reply.send(session.shutdown().await);
                return;
            }
        }
    }

    // Every handle dropped without an explicit shutdown — tear down anyway
    // so no server processes are orphaned.
    let _ = session.shutdown().await;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::ModelReply;
    use crate::chat::testing::ScriptedBackend;

    fn start(
        backend: Arc<ScriptedBackend>,
    ) -> (tokio::runtime::Runtime, SessionHandle, JoinHandle<()>) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (handle, join) = {
            let _guard = rt.enter();
            spawn_session(ChatSession::new(backend))
        };
        (rt, handle, join)
    }

    #[test]
    fn test_chat_round_trip_from_foreign_thread() {
        let backend = ScriptedBackend::structured(vec![ModelReply::Text("pong".into())]);
        let (rt, handle, join) = start(backend);

        let reply = handle.chat("ping", Duration::from_secs(5)).unwrap();
        assert_eq!(reply.text, "pong");

        handle.shutdown(Duration::from_secs(5)).unwrap();
        rt.block_on(join).unwrap();
    }

    #[test]
    fn test_submission_timeout_is_recoverable() {
        let backend = ScriptedBackend::structured_with_delay(
            vec![
                ModelReply::Text("slow".into()),
                ModelReply::Text("second".into()),
            ],
            Duration::from_millis(200),
        );
        let (rt, handle, join) = start(backend);

        // First submission gives up before the session answers.
        let err = handle.chat("one", Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, ChatError::SubmissionTimeout { .. }));

        // The session is still alive and serves the next request.
        let reply = handle.chat("two", Duration::from_secs(5)).unwrap();
        assert_eq!(reply.text, "second");

        handle.shutdown(Duration::from_secs(5)).unwrap();
        rt.block_on(join).unwrap();
    }

    #[test]
    fn test_commands_after_shutdown_report_closed() {
        let backend = ScriptedBackend::structured(vec![]);
        let (rt, handle, join) = start(backend);

        handle.shutdown(Duration::from_secs(5)).unwrap();
        rt.block_on(join).unwrap();

        let err = handle.chat("hello?", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ChatError::SessionClosed));
    }

    #[test]
    fn test_list_connections_empty() {
        let backend = ScriptedBackend::structured(vec![]);
        let (rt, handle, join) = start(backend);

        let connections = handle.list_connections(Duration::from_secs(5)).unwrap();
        assert!(connections.is_empty());

        handle.shutdown(Duration::from_secs(5)).unwrap();
        rt.block_on(join).unwrap();
    }
}
