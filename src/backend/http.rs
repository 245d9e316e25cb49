//! HTTP completion backend (OpenAI-compatible chat completions).
//!
//! One non-streaming `POST {base_url}/chat/completions` per completion.
//! History turns are rendered to wire messages here — note that a single
//! aggregated tool turn fans out into one wire message per tool result,
//! because the wire format wants them separate while the conversation
//! model keeps one turn per execution round.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BackendSettings;

use super::client::{CompletionBackend, CompletionRequest};
use super::errors::BackendError;
use super::types::{ModelReply, ToolCallRequest, ToolParadigm, Turn, TurnRole};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout. Completions over long histories with tool results
/// can take a while, especially against local runtimes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── Wire Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    /// `""` rather than `null` for call-only assistant messages — several
    /// OpenAI-compatible runtimes mishandle null content.
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Debug, Serialize)]
struct RequestBody {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

// ─── HttpBackend ─────────────────────────────────────────────────────────────

/// Completion backend over an OpenAI-compatible HTTP endpoint.
pub struct HttpBackend {
    http: HttpClient,
    settings: BackendSettings,
}

impl HttpBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        if settings.base_url.trim().is_empty() {
            return Err(BackendError::NotConfigured {
                reason: "backend base_url is empty".into(),
            });
        }
        if settings.model.trim().is_empty() {
            return Err(BackendError::NotConfigured {
                reason: "backend model is empty".into(),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Http {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    /// Resolve the API key at call time so a key set after startup is
    /// picked up without reconstructing the backend.
    fn api_key(&self) -> Result<Option<String>, BackendError> {
        match &self.settings.api_key_env {
            None => Ok(None),
            Some(var) => std::env::var(var).map(Some).map_err(|_| {
                BackendError::NotConfigured {
                    reason: format!("API key environment variable '{var}' is not set"),
                }
            }),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn paradigm(&self) -> ToolParadigm {
        self.settings.paradigm
    }

    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<ModelReply, BackendError> {
        let body = build_request_body(&self.settings, &request);
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = self.api_key()? {
            req = req.bearer_auth(key);
        }

        tracing::debug!(
            model = %self.settings.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "sending completion request"
        );

        let response = req.send().await.map_err(|e| BackendError::Http {
            reason: format!("request to {url} failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                reason: format!("completion endpoint returned {status}: {detail}"),
            });
        }

        let parsed: ResponseBody =
            response.json().await.map_err(|e| BackendError::InvalidResponse {
                reason: format!("failed to parse completion response: {e}"),
            })?;

        interpret_response(parsed)
    }
}

// ─── Request Building ────────────────────────────────────────────────────────

fn build_request_body(
    settings: &BackendSettings,
    request: &CompletionRequest<'_>,
) -> RequestBody {
    let mut messages = Vec::new();
    if let Some(system) = request.system {
        if !system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: system.to_string(),
                tool_call_id: None,
                tool_calls: None,
            });
        }
    }
    for turn in request.history {
        messages.extend(turn_to_wire(turn));
    }

    let tools = request.declarations.and_then(|decls| {
        if decls.is_empty() {
            None
        } else {
            Some(decls.iter().map(|d| d.to_wire_value()).collect())
        }
    });

    RequestBody {
        model: settings.model.clone(),
        messages,
        tools,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    }
}

fn turn_to_wire(turn: &Turn) -> Vec<WireMessage> {
    match turn.role {
        TurnRole::User => vec![WireMessage {
            role: "user",
            content: turn.text.clone().unwrap_or_default(),
            tool_call_id: None,
            tool_calls: None,
        }],
        TurnRole::System => vec![WireMessage {
            role: "system",
            content: turn.text.clone().unwrap_or_default(),
            tool_call_id: None,
            tool_calls: None,
        }],
        TurnRole::Model => {
            let tool_calls = if turn.tool_calls.is_empty() {
                None
            } else {
                Some(
                    turn.tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            kind: "function".into(),
                            function: WireFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };
            vec![WireMessage {
                role: "assistant",
                content: turn.text.clone().unwrap_or_default(),
                tool_call_id: None,
                tool_calls,
            }]
        }
        TurnRole::Tool => turn
            .tool_results
            .iter()
            .map(|result| WireMessage {
                role: "tool",
                content: result.result.clone(),
                tool_call_id: Some(result.call_id.clone()),
                tool_calls: None,
            })
            .collect(),
    }
}

// ─── Response Interpretation ─────────────────────────────────────────────────

fn interpret_response(body: ResponseBody) -> Result<ModelReply, BackendError> {
    let Some(choice) = body.choices.into_iter().next() else {
        return Ok(ModelReply::Empty);
    };

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Ok(ModelReply::Blocked {
            reason: "content_filter".into(),
        });
    }

    if let Some(wire_calls) = choice.message.tool_calls {
        if !wire_calls.is_empty() {
            let mut calls = Vec::with_capacity(wire_calls.len());
            for wire in wire_calls {
                let arguments: serde_json::Value = serde_json::from_str(
                    &wire.function.arguments,
                )
                .map_err(|e| BackendError::InvalidResponse {
                    reason: format!(
                        "tool call '{}' has invalid JSON arguments: {e}",
                        wire.function.name
                    ),
                })?;
                let id = if wire.id.is_empty() {
                    format!("call_{}", Uuid::new_v4())
                } else {
                    wire.id
                };
                calls.push(ToolCallRequest {
                    id,
                    name: wire.function.name,
                    arguments,
                });
            }
            let text = choice
                .message
                .content
                .filter(|c| !c.trim().is_empty());
            return Ok(ModelReply::ToolCalls { text, calls });
        }
    }

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(ModelReply::Text(content)),
        _ => Ok(ModelReply::Empty),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
