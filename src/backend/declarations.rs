//! Schema translation — tool descriptors to backend declarations.
//!
//! The structured paradigm needs typed parameter declarations; providers
//! hand us free-form JSON Schema. The mapping is deliberately lossy where
//! the paradigms diverge:
//!
//! - an `object` property with no sub-properties cannot be expressed in a
//!   strict typed schema, so it is downgraded to a string and the model is
//!   told to pass JSON in that string
//! - unmappable property types are dropped, not fatal
//! - a tool whose top-level schema is not an object is left out of the
//!   structured set entirely (it can still be dispatched by name)
//!
//! Every translation problem is a logged warning, never an error.
//!
//! Output is memoized per paradigm in `DeclarationCache` keyed on the
//! registry's tool-set generation, so nothing is recomputed until the
//! registry actually changes.

use serde::Serialize;

use crate::mcp_client::{ServerRegistry, ToolDescriptor};

/// Note appended to a property description when an opaque `object` is
/// downgraded to a string.
pub const JSON_STRING_NOTE: &str = " (Provide as JSON string)";

// ─── Declaration Types ───────────────────────────────────────────────────────

/// Parameter types expressible in the structured paradigm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Map a JSON Schema type tag, case-insensitively.
    fn from_schema_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// The wire tag used in serialized declarations.
    pub fn json_tag(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One translated parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDeclaration {
    pub name: String,
    pub kind: ParamType,
    pub description: Option<String>,
}

/// One tool rendered for the structured paradigm.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub properties: Vec<PropertyDeclaration>,
    /// Required property names, restricted to properties that survived
    /// translation.
    pub required: Vec<String>,
}

impl FunctionDeclaration {
    /// Serialize into the function-calling wire format.
    pub fn to_wire_value(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for prop in &self.properties {
            let mut schema = serde_json::Map::new();
            schema.insert("type".into(), prop.kind.json_tag().into());
            if let Some(desc) = &prop.description {
                schema.insert("description".into(), desc.clone().into());
            }
            properties.insert(prop.name.clone(), serde_json::Value::Object(schema));
        }

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": self.required,
                }
            }
        })
    }
}

// ─── Translation ─────────────────────────────────────────────────────────────

/// Translate descriptors into structured declarations, applying the lossy
/// mapping rules above.
pub fn translate_descriptors(descriptors: &[ToolDescriptor]) -> Vec<FunctionDeclaration> {
    let mut declarations = Vec::new();

    for tool in descriptors {
        match translate_one(tool) {
            Some(decl) => declarations.push(decl),
            None => continue,
        }
    }

    tracing::info!(count = declarations.len(), "built structured tool declarations");
    declarations
}

fn translate_one(tool: &ToolDescriptor) -> Option<FunctionDeclaration> {
    let schema = match tool.input_schema.as_object() {
        Some(obj) => obj,
        None => {
            tracing::warn!(
                tool = %tool.name,
                "input schema is not an object — excluding from structured declarations"
            );
            return None;
        }
    };

    let top_type = schema
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    if !top_type.eq_ignore_ascii_case("object") {
        tracing::warn!(
            tool = %tool.name,
            schema_type = %top_type,
            "non-object input schema — excluding from structured declarations"
        );
        return None;
    }

    let declared = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();
    let declared_any = !declared.is_empty();

    let mut properties = Vec::new();
    for (prop_name, prop_schema) in &declared {
        let prop_schema = match prop_schema.as_object() {
            Some(obj) => obj,
            None => {
                tracing::warn!(
                    tool = %tool.name,
                    property = %prop_name,
                    "property schema is not an object — dropping property"
                );
                continue;
            }
        };

        let tag = prop_schema
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        let mut kind = ParamType::from_schema_tag(tag);
        let mut description = prop_schema
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default()
            .to_string();

        // An object with no nested properties has no faithful typed
        // rendering — downgrade to a JSON-in-string parameter.
        let opaque_object = kind == Some(ParamType::Object)
            && prop_schema
                .get("properties")
                .and_then(|p| p.as_object())
                .map(|p| p.is_empty())
                .unwrap_or(true);
        if opaque_object {
            tracing::warn!(
                tool = %tool.name,
                property = %prop_name,
                "object property without sub-properties — downgrading to string"
            );
            kind = Some(ParamType::String);
            description.push_str(JSON_STRING_NOTE);
        }

        match kind {
            Some(kind) => properties.push(PropertyDeclaration {
                name: prop_name.clone(),
                kind,
                description: if description.trim().is_empty() {
                    None
                } else {
                    Some(description.trim().to_string())
                },
            }),
            None => {
                tracing::warn!(
                    tool = %tool.name,
                    property = %prop_name,
                    schema_type = %tag,
                    "unmappable property type — dropping property"
                );
            }
        }
    }

    // Declared properties that all failed to map means we would advertise a
    // signature the tool cannot honor — skip it. A genuinely parameterless
    // tool stays in as an empty-parameter function.
    if properties.is_empty() && declared_any {
        tracing::warn!(
            tool = %tool.name,
            "no properties survived translation — skipping tool"
        );
        return None;
    }

    let surviving: std::collections::HashSet<&str> =
        properties.iter().map(|p| p.name.as_str()).collect();
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|name| surviving.contains(name))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Some(FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        properties,
        required,
    })
}

// ─── Generic Paradigm Output ─────────────────────────────────────────────────

/// Declarations for backends without native function calling: a plain-text
/// catalogue for the system prompt plus pass-through wire values.
#[derive(Debug, Clone)]
pub struct GenericDeclarations {
    /// `"You have access to the following tools:\n- name: description"` …
    pub catalogue: String,
    /// Raw function-format values with the provider schema untouched — the
    /// generic paradigm does not need the strict typed mapping.
    pub tools: Vec<serde_json::Value>,
}

fn build_generic(descriptors: &[ToolDescriptor]) -> GenericDeclarations {
    let lines: Vec<String> = descriptors
        .iter()
        .map(|tool| {
            let description = if tool.description.is_empty() {
                "No description"
            } else {
                &tool.description
            };
            format!("- {}: {description}", tool.name)
        })
        .collect();

    let catalogue = if lines.is_empty() {
        String::new()
    } else {
        format!(
            "You have access to the following tools:\n{}",
            lines.join("\n")
        )
    };

    let tools = descriptors
        .iter()
        .map(|tool| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect();

    GenericDeclarations { catalogue, tools }
}

// ─── DeclarationCache ────────────────────────────────────────────────────────

/// Per-paradigm memoized declarations.
///
/// Each entry remembers the registry generation it was computed from;
/// a generation mismatch is the dirty flag, and recomputing stores the
/// current generation (clearing it).
pub struct DeclarationCache {
    structured: Option<(u64, Vec<FunctionDeclaration>)>,
    generic: Option<(u64, GenericDeclarations)>,
}

impl DeclarationCache {
    pub fn new() -> Self {
        Self {
            structured: None,
            generic: None,
        }
    }

    /// Structured declarations for the registry's current tool set.
    pub fn structured(&mut self, registry: &ServerRegistry) -> &[FunctionDeclaration] {
        let generation = registry.generation();
        let stale = !matches!(&self.structured, Some((g, _)) if *g == generation);
        if stale {
            tracing::info!(generation, "rebuilding structured tool declarations");
            let declarations = translate_descriptors(&registry.tool_descriptors());
            self.structured = Some((generation, declarations));
        }
        &self.structured.as_ref().unwrap().1
    }

    /// Generic-paradigm declarations for the registry's current tool set.
    pub fn generic(&mut self, registry: &ServerRegistry) -> &GenericDeclarations {
        let generation = registry.generation();
        let stale = !matches!(&self.generic, Some((g, _)) if *g == generation);
        if stale {
            tracing::info!(generation, "rebuilding generic tool catalogue");
            let generic = build_generic(&registry.tool_descriptors());
            self.generic = Some((generation, generic));
        }
        &self.generic.as_ref().unwrap().1
    }
}

impl Default for DeclarationCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::registry::connect_session;
    use crate::mcp_client::testing::MockSession;
    use tokio::sync::Mutex;

    fn descriptor(name: &str, schema: serde_json::Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("Test tool: {name}"),
            input_schema: schema,
        }
    }

    #[test]
    fn test_primitive_mapping_case_insensitive() {
        let tool = descriptor(
            "t",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "a": {"type": "STRING"},
                    "b": {"type": "Number"},
                    "c": {"type": "integer"},
                    "d": {"type": "boolean"},
                    "e": {"type": "array"},
                },
                "required": ["a", "c"]
            }),
        );
        let decls = translate_descriptors(&[tool]);
        assert_eq!(decls.len(), 1);
        let decl = &decls[0];
        assert_eq!(decl.properties.len(), 5);
        let kind_of = |name: &str| {
            decl.properties
                .iter()
                .find(|p| p.name == name)
                .unwrap()
                .kind
        };
        assert_eq!(kind_of("a"), ParamType::String);
        assert_eq!(kind_of("b"), ParamType::Number);
        assert_eq!(kind_of("c"), ParamType::Integer);
        assert_eq!(kind_of("d"), ParamType::Boolean);
        assert_eq!(kind_of("e"), ParamType::Array);
        assert_eq!(decl.required, vec!["a", "c"]);
    }

    #[test]
    fn test_opaque_object_downgraded_to_string_with_note() {
        let tool = descriptor(
            "config_tool",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "options": {"type": "object", "description": "Options blob"}
                }
            }),
        );
        let decls = translate_descriptors(&[tool]);
        let prop = &decls[0].properties[0];
        assert_eq!(prop.kind, ParamType::String);
        let desc = prop.description.as_deref().unwrap();
        assert!(
            desc.ends_with(JSON_STRING_NOTE.trim_start()),
            "description should end with the JSON-string note, got: {desc}"
        );
    }

    #[test]
    fn test_object_with_sub_properties_kept_as_object() {
        let tool = descriptor(
            "t",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "point": {
                        "type": "object",
                        "properties": {"x": {"type": "number"}}
                    }
                }
            }),
        );
        let decls = translate_descriptors(&[tool]);
        assert_eq!(decls[0].properties[0].kind, ParamType::Object);
    }

    #[test]
    fn test_unmappable_property_dropped_not_fatal() {
        let tool = descriptor(
            "t",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "good": {"type": "string"},
                    "bad": {"type": "tuple"},
                },
                "required": ["good", "bad"]
            }),
        );
        let decls = translate_descriptors(&[tool]);
        assert_eq!(decls[0].properties.len(), 1);
        assert_eq!(decls[0].properties[0].name, "good");
        // "bad" cannot stay required once dropped.
        assert_eq!(decls[0].required, vec!["good"]);
    }

    #[test]
    fn test_non_object_top_level_excluded() {
        let tools = vec![
            descriptor("strange", serde_json::json!({"type": "array"})),
            descriptor(
                "fine",
                serde_json::json!({"type": "object", "properties": {}}),
            ),
        ];
        let decls = translate_descriptors(&tools);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "fine");
    }

    #[test]
    fn test_all_properties_unmappable_skips_tool() {
        let tool = descriptor(
            "t",
            serde_json::json!({
                "type": "object",
                "properties": {"weird": {"type": "tuple"}}
            }),
        );
        assert!(translate_descriptors(&[tool]).is_empty());
    }

    #[test]
    fn test_parameterless_tool_kept() {
        let tool = descriptor(
            "ping",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        let decls = translate_descriptors(&[tool]);
        assert_eq!(decls.len(), 1);
        assert!(decls[0].properties.is_empty());
        assert!(decls[0].required.is_empty());
    }

    #[test]
    fn test_wire_value_shape() {
        let tool = descriptor(
            "add",
            serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "number", "description": "left"}},
                "required": ["a"]
            }),
        );
        let wire = translate_descriptors(&[tool])[0].to_wire_value();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "add");
        assert_eq!(
            wire["function"]["parameters"]["properties"]["a"]["type"],
            "number"
        );
        assert_eq!(wire["function"]["parameters"]["required"][0], "a");
    }

    #[test]
    fn test_generic_catalogue_lines() {
        let generic = build_generic(&[
            descriptor("add", serde_json::json!({"type": "object"})),
            ToolDescriptor {
                name: "blank".into(),
                description: String::new(),
                input_schema: serde_json::json!({"type": "object"}),
            },
        ]);
        assert!(generic
            .catalogue
            .starts_with("You have access to the following tools:"));
        assert!(generic.catalogue.contains("- add: Test tool: add"));
        assert!(generic.catalogue.contains("- blank: No description"));
        assert_eq!(generic.tools.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_recomputes_only_when_generation_moves() {
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "a", MockSession::with_tools(&["add"]))
            .await
            .unwrap();

        let mut cache = DeclarationCache::new();
        {
            let reg = registry.lock().await;
            assert_eq!(cache.structured(&reg).len(), 1);
            // Second read off the same generation hits the memo; same output.
            assert_eq!(cache.structured(&reg).len(), 1);
        }

        // Registry change invalidates on the next read.
        connect_session(&registry, "b", MockSession::with_tools(&["mul"]))
            .await
            .unwrap();
        {
            let reg = registry.lock().await;
            assert_eq!(cache.structured(&reg).len(), 2);
        }

        crate::mcp_client::registry::disconnect(&registry, "b")
            .await
            .unwrap();
        {
            let reg = registry.lock().await;
            assert_eq!(cache.structured(&reg).len(), 1);
            assert!(!cache.generic(&reg).catalogue.contains("mul"));
        }
    }
}
