//! Tool-server sessions — the protocol surface one connection exposes.
//!
//! `ToolServerSession` is the seam between the registry and the wire: the
//! production implementation speaks JSON-RPC over a spawned child's stdio,
//! and tests substitute scripted fakes. The registry, dispatcher, and health
//! monitor only ever see this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::errors::McpError;
use super::transport::{extract_result, StdioTransport};
use super::types::{InitializeResult, LaunchSpec, ListToolsResult, ToolDescriptor};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake. Generous because interpreter-based
/// servers may import heavy frameworks at startup.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single tool call.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a `tools/list` request (discovery and health probes).
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Session Trait ───────────────────────────────────────────────────────────

/// One live session with a tool-server process.
///
/// A session accepts one in-flight request at a time (enforced by the
/// transport); callers may invoke these methods from concurrent tasks and
/// the calls serialize rather than interleave.
#[async_trait]
pub trait ToolServerSession: Send + Sync {
    /// List the tools the server currently advertises. Doubles as the
    /// health-probe operation.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError>;

    /// Invoke a tool and return its content as a string.
    async fn call_tool(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, McpError>;

    /// Tear the session down, terminating the server process.
    async fn close(&self);
}

// ─── Stdio Implementation ────────────────────────────────────────────────────

/// Production session over a spawned child process.
pub struct StdioSession {
    identifier: String,
    transport: StdioTransport,
}

#[async_trait]
impl ToolServerSession for StdioSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let response = self
            .request_with_timeout("tools/list", None, LIST_TIMEOUT)
            .await?;
        let result = extract_result(response)?;
        let listed: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::Transport {
                identifier: self.identifier.clone(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;
        Ok(listed.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<String, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": args,
        });
        let response = self
            .request_with_timeout("tools/call", Some(params), CALL_TIMEOUT)
            .await?;
        let result = extract_result(response)?;
        Ok(content_to_string(&result))
    }

    async fn close(&self) {
        self.transport.close().await;
    }
}

impl StdioSession {
    async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<crate::mcp_client::types::JsonRpcResponse, McpError> {
        tokio::time::timeout(timeout, self.transport.request(method, params))
            .await
            .map_err(|_| McpError::Timeout {
                identifier: self.identifier.clone(),
                operation: method.to_string(),
                seconds: timeout.as_secs(),
            })?
    }
}

/// Flatten a `tools/call` result into the content string handed to the model.
///
/// Servers return either a plain string under `content`, a structured value
/// under `content`, or a bare value. Structured values are re-serialized.
fn content_to_string(result: &serde_json::Value) -> String {
    let content = result.get("content").unwrap_or(result);
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn a tool-server process and run the `initialize` handshake.
///
/// On any failure the child is killed before the error is returned, so no
/// stray processes outlive a failed connect.
pub async fn spawn_session(
    identifier: &str,
    spec: &LaunchSpec,
) -> Result<Arc<dyn ToolServerSession>, McpError> {
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::ConnectFailed {
        identifier: identifier.to_string(),
        reason: format!("failed to spawn '{}': {e}", spec.command),
    })?;

    let stdin = child.stdin.take().ok_or_else(|| McpError::ConnectFailed {
        identifier: identifier.to_string(),
        reason: "failed to capture stdin".into(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| McpError::ConnectFailed {
        identifier: identifier.to_string(),
        reason: "failed to capture stdout".into(),
    })?;

    let session = StdioSession {
        identifier: identifier.to_string(),
        transport: StdioTransport::new(identifier, child, stdin, stdout),
    };

    match tokio::time::timeout(INIT_TIMEOUT, initialize(&session)).await {
        Ok(Ok(())) => Ok(Arc::new(session)),
        Ok(Err(e)) => {
            session.close().await;
            Err(McpError::ConnectFailed {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            session.close().await;
            Err(McpError::ConnectFailed {
                identifier: identifier.to_string(),
                reason: format!(
                    "initialization timed out after {}s",
                    INIT_TIMEOUT.as_secs()
                ),
            })
        }
    }
}

/// Perform the `initialize` handshake.
async fn initialize(session: &StdioSession) -> Result<(), McpError> {
    let response = session.transport.request("initialize", None).await?;
    let result = extract_result(response)?;
    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::Transport {
            identifier: session.identifier.clone(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    if let Some(info) = init.server_info {
        tracing::debug!(
            server = %session.identifier,
            name = info.name.as_deref().unwrap_or("unknown"),
            version = info.version.as_deref().unwrap_or("unknown"),
            "initialized tool server"
        );
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
