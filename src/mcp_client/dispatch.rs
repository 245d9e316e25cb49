//! Tool dispatch — routes a named call to its owning connection.
//!
//! Outcomes are data (`ToolOutcome`), never errors: an unknown name, a
//! transport failure, and a server-side error all come back as values the
//! orchestrator folds into the conversation.
//!
//! The registry lock is held only to resolve the session and to record the
//! status transition afterwards — the `callTool` round trip itself runs
//! unlocked, so calls to different connections overlap freely. Two calls
//! aimed at the same connection serialize on that transport's in-flight
//! lock; no extra coordination happens here, and none may be added that
//! would issue them concurrently on the wire.

use tokio::sync::Mutex;

use super::registry::{display_name, ServerRegistry};
use super::types::{ServerStatus, ToolOutcome};

/// Execute one tool call.
///
/// A successful call flips an `Error` connection back to `Connected`
/// without waiting for the next health probe; a failed call marks the
/// connection `Error`.
pub async fn execute(
    registry: &Mutex<ServerRegistry>,
    name: &str,
    args: &serde_json::Value,
) -> ToolOutcome {
    let (identifier, session) = {
        let reg = registry.lock().await;
        match reg.session_for_tool(name) {
            Some(resolved) => resolved,
            None => {
                tracing::warn!(tool = %name, "tool call for unknown or disconnected tool");
                return ToolOutcome::NotFound;
            }
        }
    };

    tracing::info!(tool = %name, server = %display_name(&identifier), args = %args, "executing tool");

    match session.call_tool(name, args).await {
        Ok(content) => {
            let mut reg = registry.lock().await;
            if reg.set_status(&identifier, ServerStatus::Connected)
                == Some(ServerStatus::Error)
            {
                tracing::info!(
                    server = %display_name(&identifier),
                    "server recovered on successful tool call"
                );
            }
            ToolOutcome::Success { content }
        }
        Err(e) => {
            tracing::error!(
                tool = %name,
                server = %display_name(&identifier),
                error = %e,
                "tool execution failed"
            );
            let mut reg = registry.lock().await;
            // The connection may have been torn down mid-call; a dropped
            // status update is fine then.
            reg.set_status(&identifier, ServerStatus::Error);
            ToolOutcome::Failure {
                message: format!("Error executing tool '{name}': {e}"),
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::registry::connect_session;
    use crate::mcp_client::testing::MockSession;

    #[tokio::test]
    async fn test_execute_unknown_tool_is_not_found() {
        let registry = Mutex::new(ServerRegistry::new());
        let outcome = execute(&registry, "nope", &serde_json::json!({})).await;
        assert_eq!(outcome, ToolOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_execute_success_returns_content() {
        let session = MockSession::with_tools(&["add"]).respond_with("add", "3");
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session).await.unwrap();

        let outcome = execute(&registry, "add", &serde_json::json!({"a": 1, "b": 2})).await;
        assert_eq!(
            outcome,
            ToolOutcome::Success {
                content: "3".into()
            }
        );
    }

    #[tokio::test]
    async fn test_execute_failure_marks_connection_error() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();

        session.set_healthy(false);
        let outcome = execute(&registry, "add", &serde_json::json!({})).await;
        assert!(matches!(outcome, ToolOutcome::Failure { .. }));
        assert_eq!(
            registry.lock().await.status_of("calc"),
            Some(ServerStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_execute_success_self_heals_error_status() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();
        registry
            .lock()
            .await
            .set_status("calc", ServerStatus::Error);

        // No probe tick needed — the successful call itself recovers it.
        let outcome = execute(&registry, "add", &serde_json::json!({})).await;
        assert!(matches!(outcome, ToolOutcome::Success { .. }));
        assert_eq!(
            registry.lock().await.status_of("calc"),
            Some(ServerStatus::Connected)
        );
    }

    #[tokio::test]
    async fn test_failure_message_carried_verbatim() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();
        session.set_healthy(false);

        let outcome = execute(&registry, "add", &serde_json::json!({})).await;
        let ToolOutcome::Failure { message } = outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Error executing tool 'add':"));
        // The same text is what the model sees as the tool result.
        assert_eq!(
            ToolOutcome::Failure {
                message: message.clone()
            }
            .result_text("add"),
            message
        );
    }
}
