//! Generic-paradigm reply sniffing.
//!
//! Backends without native function calling signal tool intent by writing a
//! JSON array of function-call objects as their reply text. Detection is a
//! heuristic shape check and nothing more: a model emitting JSON-looking
//! prose can be misclassified, and that fragility is accepted, documented
//! behavior — parse failure falls back to treating the reply as the final
//! answer, so the worst case is no tools running, never a crash.

use uuid::Uuid;

use super::types::ToolCallRequest;

/// Cheap shape test applied before attempting a real parse: the reply must
/// start with `[` and mention `"function"` somewhere.
pub fn looks_like_tool_calls(text: &str) -> bool {
    text.trim_start().starts_with('[') && text.contains("function")
}

/// Parse a reply as a list of tool-call requests.
///
/// Expected element shape (the function-calling convention):
/// `{"function": {"name": "...", "arguments": {...} | "json string"}}`.
///
/// Returns `None` when anything about the reply fails to parse — the caller
/// then returns the original reply unmodified.
pub fn parse_generic_tool_calls(text: &str) -> Option<Vec<ToolCallRequest>> {
    if !looks_like_tool_calls(text) {
        return None;
    }

    let items: Vec<serde_json::Value> = serde_json::from_str(text.trim()).ok()?;
    if items.is_empty() {
        return None;
    }

    let mut calls = Vec::with_capacity(items.len());
    for item in items {
        let function = item.get("function")?;
        let name = function.get("name")?.as_str()?.to_string();

        let arguments = match function.get("arguments") {
            // Arguments arrive either inline or as a JSON-encoded string.
            Some(serde_json::Value::String(raw)) => serde_json::from_str(raw).ok()?,
            Some(value) => value.clone(),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));

        calls.push(ToolCallRequest {
            id,
            name,
            arguments,
        });
    }

    Some(calls)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_call_with_string_arguments() {
        let text = r#"[{"function": {"name": "add", "arguments": "{\"a\": 1, \"b\": 2}"}}]"#;
        let calls = parse_generic_tool_calls(text).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "add");
        assert_eq!(calls[0].arguments["a"], 1);
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_parse_multiple_calls_with_inline_arguments() {
        let text = r#"[
            {"function": {"name": "add", "arguments": {"a": 1, "b": 2}}},
            {"function": {"name": "mul", "arguments": {"a": 3, "b": 4}}}
        ]"#;
        let calls = parse_generic_tool_calls(text).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].name, "mul");
        assert_eq!(calls[1].arguments["b"], 4);
    }

    #[test]
    fn test_missing_arguments_default_to_empty_object() {
        let text = r#"[{"function": {"name": "ping"}}]"#;
        let calls = parse_generic_tool_calls(text).unwrap();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_prose_reply_is_not_a_tool_call() {
        assert!(parse_generic_tool_calls("The answer is 42.").is_none());
        assert!(!looks_like_tool_calls("Sure, here is a function for you"));
    }

    #[test]
    fn test_json_looking_prose_without_function_rejected() {
        // Starts with a bracket but never mentions "function".
        assert!(parse_generic_tool_calls(r#"["a", "b", "c"]"#).is_none());
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let text = r#"[{"function": {"name": "add", "arguments": "{not json"}}]"#;
        assert!(parse_generic_tool_calls(text).is_none());
    }

    #[test]
    fn test_item_without_name_falls_back() {
        let text = r#"[{"function": {"arguments": {}}}]"#;
        assert!(parse_generic_tool_calls(text).is_none());
    }
}
