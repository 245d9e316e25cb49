//! JSON-RPC over stdio transport to a tool-server child process.
//!
//! Line-delimited protocol: one JSON object per line on stdin/stdout. The
//! transport owns the child process — closing the transport kills it, which
//! is how `disconnect` terminates a server.
//!
//! The request/response cycle runs under one I/O lock, so a transport
//! accepts exactly one in-flight call at a time. The dispatcher relies on
//! this: concurrent calls aimed at the same connection queue up here
//! instead of interleaving on the wire. The child handle sits outside that
//! lock so `close` can kill the process while a call is in flight — the
//! blocked read then sees EOF and the call fails normally.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

struct TransportIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Request/response channel to one tool-server process.
pub struct StdioTransport {
    identifier: String,
    closed: AtomicBool,
    child: Mutex<Child>,
    io: Mutex<TransportIo>,
}

impl StdioTransport {
    /// Wrap a spawned child whose stdin/stdout have already been captured.
    pub fn new(identifier: &str, child: Child, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            identifier: identifier.to_string(),
            closed: AtomicBool::new(false),
            child: Mutex::new(child),
            io: Mutex::new(TransportIo {
                stdin,
                stdout: BufReader::new(stdout),
            }),
        }
    }

    fn transport_err(&self, reason: String) -> McpError {
        McpError::Transport {
            identifier: self.identifier.clone(),
            reason,
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Holds the I/O lock for the full round trip — see the module docs.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.transport_err("transport is closed".into()));
        }

        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req)
            .map_err(|e| self.transport_err(format!("failed to serialize request: {e}")))?;
        json.push('\n');

        let mut io = self.io.lock().await;

        io.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_err(format!("failed to write to stdin: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| self.transport_err(format!("failed to flush stdin: {e}")))?;

        // Read lines until the response with our id arrives. Non-JSON lines
        // are server log noise and skipped.
        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = io
                .stdout
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_err(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_err(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    /// Kill the child process and mark the transport closed.
    ///
    /// Does not wait for the I/O lock: an in-flight call observes EOF on
    /// the dead child's stdout and fails as a normal transport error —
    /// outstanding calls are not cancelled, they fail.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            tracing::debug!(
                server = %self.identifier,
                error = %e,
                "child process already gone on close"
            );
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting the error branch
/// to `McpError::Server`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::Server {
            code: err.code,
            message: err.message,
        });
    }

    response.result.ok_or(McpError::Server {
        code: -32603,
        message: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: Some(serde_json::json!({"content": "hello"})),
            error: None,
        };
        let result = extract_result(resp).unwrap();
        assert_eq!(result["content"], "hello");
    }

    #[test]
    fn test_extract_result_error() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: Some(crate::mcp_client::types::JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        let err = extract_result(resp).unwrap_err();
        match err {
            McpError::Server { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: None,
        };
        assert!(matches!(
            extract_result(resp),
            Err(McpError::Server { .. })
        ));
    }
}
