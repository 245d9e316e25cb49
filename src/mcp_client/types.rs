//! Shared types for the tool-server client.
//!
//! JSON-RPC 2.0 message types and the tool-provider protocol structures.

use serde::{Deserialize, Serialize};

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── Tool-Provider Protocol Types ───────────────────────────────────────────

/// A callable capability advertised by a tool server.
///
/// Immutable once discovered — the registry never rewrites a descriptor,
/// it only indexes or drops it wholesale with its owning connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema tree for the tool's arguments.
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// How to launch a tool-server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
}

impl LaunchSpec {
    /// Launch spec for a bare command with arguments.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: std::collections::HashMap::new(),
        }
    }
}

/// Liveness status of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Connected,
    Error,
}

/// Read-only view of one registered connection, for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub identifier: String,
    /// Short human-readable name (file stem for path-like identifiers).
    pub display_name: String,
    pub tools: Vec<String>,
    pub status: ServerStatus,
}

/// Outcome of dispatching a single tool call.
///
/// These are results, not errors — a missing tool or a failed execution is
/// normal data the orchestrator (and ultimately the model) reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The call ran and returned content.
    Success { content: String },
    /// The tool name is not in the registry.
    NotFound,
    /// The call reached the server but failed.
    Failure { message: String },
}

impl ToolOutcome {
    /// Status label used in the `TOOL_CALL_END` observability marker:
    /// `"Success"` on success, the failure text otherwise.
    pub fn status_label(&self, tool_name: &str) -> String {
        match self {
            Self::Success { .. } => "Success".to_string(),
            Self::NotFound => {
                format!("Error: Tool '{tool_name}' not found or its server is disconnected.")
            }
            Self::Failure { message } => message.clone(),
        }
    }

    /// The string handed back to the model as the tool's result: the content
    /// on success, the failure text verbatim otherwise.
    pub fn result_text(&self, tool_name: &str) -> String {
        match self {
            Self::Success { content } => content.clone(),
            _ => self.status_label(tool_name),
        }
    }
}

/// Payload of the `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server identity returned by `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Payload of the `tools/list` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
    }

    #[test]
    fn test_tool_descriptor_accepts_camel_case_schema() {
        let json = r#"{
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {"type": "object", "properties": {}}
        }"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "add");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_descriptor_defaults() {
        let json = r#"{"name": "ping"}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert!(tool.description.is_empty());
        assert!(tool.input_schema.is_null());
    }

    #[test]
    fn test_outcome_result_text_uses_failure_verbatim() {
        let outcome = ToolOutcome::Failure {
            message: "Error executing tool 'add': boom".into(),
        };
        assert_eq!(
            outcome.result_text("add"),
            "Error executing tool 'add': boom"
        );
    }

    #[test]
    fn test_outcome_status_label_for_missing_tool() {
        let outcome = ToolOutcome::NotFound;
        let label = outcome.status_label("mul");
        assert!(label.contains("'mul'"));
        assert!(label.starts_with("Error:"));
    }
}
