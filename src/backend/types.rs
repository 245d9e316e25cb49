//! Shared types for the completion-backend bridge.
//!
//! Conversation turns, tool-call requests, and the normalized model reply
//! that both paradigms produce. These are the orchestrator-facing shapes —
//! wire formats live with the HTTP client.

use serde::{Deserialize, Serialize};

// ─── Paradigm ────────────────────────────────────────────────────────────────

/// How the active backend advertises and receives tool calls.
///
/// Selected once per session; the orchestrator branches on this exactly
/// once per turn instead of string-tagging its way through the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolParadigm {
    /// Native, schema-typed function calling.
    Structured,
    /// No native support — tool intent is sniffed out of free text.
    Generic,
}

// ─── Conversation Turns ──────────────────────────────────────────────────────

/// Role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
    Tool,
    System,
}

/// One entry in the ordered conversation history.
///
/// A model turn may carry tool calls alongside (or instead of) text; a tool
/// turn aggregates the results of every call from the preceding model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultRecord>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: Some(text.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            text: Some(text.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: Some(text.into()),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Model turn requesting tool calls, with optional accompanying text.
    pub fn model_calls(text: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: TurnRole::Model,
            text,
            tool_calls: calls,
            tool_results: Vec::new(),
        }
    }

    /// The single aggregated tool-result turn for one execution round.
    pub fn tool_results(results: Vec<ToolResultRecord>) -> Self {
        Self {
            role: TurnRole::Tool,
            text: None,
            tool_calls: Vec::new(),
            tool_results: results,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id, generated (`call_{uuid}`) when the model omits one.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The recorded result of one executed tool call — success content or the
/// failure text, verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub name: String,
    pub result: String,
}

// ─── Model Reply ─────────────────────────────────────────────────────────────

/// Normalized completion-service response.
///
/// `Blocked` and `Empty` are data, not errors — the orchestrator decides
/// what they mean for history (rollback) and for the caller (status flag).
#[derive(Debug, Clone)]
pub enum ModelReply {
    /// Final text, no tool calls.
    Text(String),
    /// One or more tool calls, possibly with accompanying text.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
    /// The service refused to answer (content policy).
    Blocked { reason: String },
    /// The service answered with no usable content.
    Empty,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serialization_skips_empty_fields() {
        let turn = Turn::user("hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_results"));
    }

    #[test]
    fn test_paradigm_deserializes_snake_case() {
        let p: ToolParadigm = serde_json::from_str("\"structured\"").unwrap();
        assert_eq!(p, ToolParadigm::Structured);
        let p: ToolParadigm = serde_json::from_str("\"generic\"").unwrap();
        assert_eq!(p, ToolParadigm::Generic);
    }

    #[test]
    fn test_model_calls_turn_shape() {
        let turn = Turn::model_calls(
            None,
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "add".into(),
                arguments: serde_json::json!({"a": 1}),
            }],
        );
        assert_eq!(turn.role, TurnRole::Model);
        assert_eq!(turn.tool_calls.len(), 1);
        assert!(turn.text.is_none());
    }
}
