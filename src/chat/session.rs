//! Chat session — drives the model/tool turn loop.
//!
//! One `ChatSession` per conversation. It owns the history, the declaration
//! cache, and the backend handle; the server registry is shared with the
//! health monitor. All mutation runs on the session's own task (see
//! `submission`), so the state needs no locking of its own.
//!
//! Two protocols, selected once by the backend's paradigm:
//!
//! - **Structured**: append the user turn, call the model with history plus
//!   typed declarations, execute any requested tools, append one aggregated
//!   tool turn, and re-invoke — until the model answers without tool calls
//!   or the round bound trips. Blocked/empty responses roll the turn back.
//! - **Generic**: one completion with the tool catalogue as system text; if
//!   the reply parses as a tool-call list, run the tools and make exactly
//!   one follow-up summarization call. No loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::backend::{
    CompletionBackend, CompletionRequest, DeclarationCache, ModelReply, ToolCallRequest,
    ToolParadigm, ToolResultRecord, Turn,
};
use crate::backend::parser::parse_generic_tool_calls;
use crate::config::{AppConfig, ChatSettings};
use crate::mcp_client::{
    dispatch, health::HealthMonitor, registry, ConnectionSnapshot, LaunchSpec, McpError,
    ServerRegistry, ToolOutcome,
};
use crate::store::ConversationStore;

use super::conversation::ConversationState;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default bound on tool-call rounds per structured turn. The loop has no
/// natural termination guarantee — a misbehaving model could request tools
/// forever — so the session refuses to go past this many rounds.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

// ─── Reply Types ────────────────────────────────────────────────────────────

/// How a chat turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    /// The model produced a final answer.
    Completed,
    /// The completion service refused the request (content policy).
    Blocked,
    /// The turn failed; history was left consistent.
    Failed,
}

/// What the caller gets back from every turn: text plus a status flag.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub status: TurnStatus,
}

impl ChatReply {
    fn completed(text: String) -> Self {
        Self {
            text,
            status: TurnStatus::Completed,
        }
    }

    fn blocked(text: String) -> Self {
        Self {
            text,
            status: TurnStatus::Blocked,
        }
    }

    fn failed(text: String) -> Self {
        Self {
            text,
            status: TurnStatus::Failed,
        }
    }
}

// ─── ChatSession ────────────────────────────────────────────────────────────

/// One conversation: registry, declarations, backend, history.
pub struct ChatSession {
    registry: Arc<Mutex<ServerRegistry>>,
    declarations: DeclarationCache,
    backend: Arc<dyn CompletionBackend>,
    history: ConversationState,
    max_tool_rounds: usize,
    probe_interval: Duration,
    health: Option<HealthMonitor>,
    store: Option<(ConversationStore, String)>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(ServerRegistry::new())),
            declarations: DeclarationCache::new(),
            backend,
            history: ConversationState::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            probe_interval: crate::mcp_client::DEFAULT_PROBE_INTERVAL,
            health: None,
            store: None,
        }
    }

    /// Apply the chat settings from the config file.
    pub fn with_settings(backend: Arc<dyn CompletionBackend>, chat: &ChatSettings) -> Self {
        let mut session = Self::new(backend);
        session.max_tool_rounds = chat.max_tool_rounds;
        session.probe_interval = Duration::from_secs(chat.probe_interval_secs);
        session
    }

    /// Override the structured-paradigm round bound.
    pub fn set_max_tool_rounds(&mut self, rounds: usize) {
        self.max_tool_rounds = rounds;
    }

    /// Attach a persistence store; finished turns are recorded under a fresh
    /// session id. The session works identically without one.
    pub fn attach_store(&mut self, store: ConversationStore) -> Result<(), crate::store::StoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        store.create_session(&session_id, None)?;
        self.store = Some((store, session_id));
        Ok(())
    }

    /// Shared handle to the registry (health monitor, presentation layers).
    pub fn registry(&self) -> Arc<Mutex<ServerRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn history(&self) -> &[Turn] {
        self.history.turns()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // ─── Server Lifecycle ───────────────────────────────────────────────

    /// Connect a tool server and return the newly added tool names.
    pub async fn connect_server(
        &self,
        identifier: &str,
        spec: LaunchSpec,
    ) -> Result<Vec<String>, McpError> {
        registry::connect(&self.registry, identifier, spec).await
    }

    /// Connect every server from the config, best-effort; failures are
    /// returned per identifier, successes stay connected.
    pub async fn connect_configured(&self, config: &AppConfig) -> Vec<(String, McpError)> {
        let mut failures = Vec::new();
        for (identifier, spec) in &config.servers {
            if let Err(e) = self.connect_server(identifier, spec.clone()).await {
                tracing::error!(server = %identifier, error = %e, "startup connect failed");
                failures.push((identifier.clone(), e));
            }
        }
        failures
    }

    pub async fn disconnect_server(&self, identifier: &str) -> Result<(), McpError> {
        registry::disconnect(&self.registry, identifier).await
    }

    pub async fn list_connections(&self) -> Vec<ConnectionSnapshot> {
        self.registry.lock().await.snapshot()
    }

    /// Start the periodic health monitor for this session's registry,
    /// probing at the configured interval.
    pub fn start_health_monitor(&mut self) {
        if self.health.is_none() {
            self.health = Some(HealthMonitor::spawn(
                Arc::clone(&self.registry),
                self.probe_interval,
            ));
        }
    }

    /// Stop the health monitor, disconnect every server, and report any
    /// teardown failures. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Vec<(String, McpError)> {
        if let Some(monitor) = self.health.take() {
            monitor.shutdown().await;
        }
        registry::cleanup_all(&self.registry).await
    }

    // ─── Turn Processing ────────────────────────────────────────────────

    /// Process one user message to completion.
    pub async fn process_query(&mut self, text: &str) -> ChatReply {
        tracing::info!(paradigm = ?self.backend.paradigm(), "processing query");
        let base_len = self.history.len();

        let reply = match self.backend.paradigm() {
            ToolParadigm::Structured => self.structured_turn(text, base_len).await,
            ToolParadigm::Generic => self.generic_turn(text, base_len).await,
        };

        self.record_new_turns(base_len);
        reply
    }

    /// Structured paradigm: the tool-call loop.
    async fn structured_turn(&mut self, text: &str, base_len: usize) -> ChatReply {
        self.history.push(Turn::user(text));
        let mut markers: Vec<String> = Vec::new();
        let mut rounds = 0usize;

        loop {
            let declarations = {
                let reg = self.registry.lock().await;
                self.declarations.structured(&reg).to_vec()
            };

            let reply = self
                .backend
                .complete(CompletionRequest {
                    system: None,
                    history: self.history.turns(),
                    declarations: if declarations.is_empty() {
                        None
                    } else {
                        Some(&declarations)
                    },
                })
                .await;

            match reply {
                Err(e) => {
                    tracing::error!(error = %e, "completion call failed");
                    self.history.rollback_to(base_len);
                    return ChatReply::failed(format!(
                        "An error occurred while processing your request: {e}"
                    ));
                }
                Ok(ModelReply::Blocked { reason }) => {
                    tracing::warn!(reason = %reason, "response blocked");
                    self.history.rollback_to(base_len);
                    return ChatReply::blocked(format!("Response blocked due to: {reason}"));
                }
                Ok(ModelReply::Empty) => {
                    tracing::warn!("model returned no usable content");
                    self.history.rollback_to(base_len);
                    return ChatReply::failed(
                        "Error: No response content from the model.".into(),
                    );
                }
                Ok(ModelReply::Text(final_text)) => {
                    self.history.push(Turn::model_text(final_text.clone()));
                    return ChatReply::completed(prefix_markers(&markers, &final_text));
                }
                Ok(ModelReply::ToolCalls { text, calls }) => {
                    if rounds >= self.max_tool_rounds {
                        tracing::warn!(
                            rounds,
                            "tool-call round limit reached — aborting the turn"
                        );
                        // Executed rounds really happened, so they stay in
                        // history; only the unexecuted request is dropped.
                        return ChatReply::failed(format!(
                            "Tool-call round limit ({}) reached without a final answer.",
                            self.max_tool_rounds
                        ));
                    }
                    rounds += 1;
                    tracing::info!(
                        round = rounds,
                        count = calls.len(),
                        "model requested tool calls"
                    );

                    self.history.push(Turn::model_calls(text, calls.clone()));
                    let results = self.execute_round(&calls, &mut markers).await;
                    self.history.push(Turn::tool_results(
                        results.into_iter().map(|(record, _)| record).collect(),
                    ));
                }
            }
        }
    }

    /// Generic paradigm: at most one round of tool execution, no loop.
    async fn generic_turn(&mut self, text: &str, base_len: usize) -> ChatReply {
        self.history.push(Turn::user(text));

        let catalogue = {
            let reg = self.registry.lock().await;
            self.declarations.generic(&reg).catalogue.clone()
        };
        let system = if catalogue.is_empty() {
            None
        } else {
            Some(catalogue.as_str())
        };

        let reply = self
            .backend
            .complete(CompletionRequest {
                system,
                history: self.history.turns(),
                declarations: None,
            })
            .await;

        let reply_text = match reply {
            Err(e) => {
                tracing::error!(error = %e, "completion call failed");
                self.history.rollback_to(base_len);
                return ChatReply::failed(format!(
                    "An error occurred while processing your request: {e}"
                ));
            }
            Ok(ModelReply::Blocked { reason }) => {
                self.history.rollback_to(base_len);
                return ChatReply::blocked(format!("Response blocked due to: {reason}"));
            }
            Ok(ModelReply::Empty) => {
                self.history.rollback_to(base_len);
                return ChatReply::failed("Error: No response content from the model.".into());
            }
            Ok(ModelReply::ToolCalls { text, .. }) => {
                // A generic backend replies in text; treat stray structured
                // calls as prose so the heuristic path below stays the only
                // tool trigger.
                text.unwrap_or_default()
            }
            Ok(ModelReply::Text(t)) => t,
        };

        let Some(calls) = parse_generic_tool_calls(&reply_text) else {
            // Plain answer (or an unparseable tool-ish reply, returned
            // unmodified) — the turn is done.
            self.history.push(Turn::model_text(reply_text.clone()));
            return ChatReply::completed(reply_text);
        };

        tracing::info!(count = calls.len(), "reply parsed as tool-call list");
        let mut markers: Vec<String> = Vec::new();
        let results = self.execute_round(&calls, &mut markers).await;

        // Exactly one follow-up call summarizing the results.
        let mut lines = Vec::with_capacity(results.len());
        for (record, outcome) in &results {
            match outcome {
                ToolOutcome::Success { content } => lines.push(format!(
                    "Tool '{}' executed successfully. Result: {content}",
                    record.name
                )),
                _ => lines.push(format!(
                    "Tool '{}' failed: {}",
                    record.name,
                    outcome.status_label(&record.name)
                )),
            }
        }
        let follow_up = format!(
            "Original query: {text}\n\nTool execution results:\n{}\n\n\
             Please provide a summary response based on these results.",
            lines.join("\n")
        );

        let follow_up_history = vec![Turn::user(follow_up)];
        let summary = self
            .backend
            .complete(CompletionRequest {
                system: None,
                history: &follow_up_history,
                declarations: None,
            })
            .await;

        match summary {
            Ok(ModelReply::Text(final_text)) => {
                self.history.push(Turn::model_text(final_text.clone()));
                ChatReply::completed(prefix_markers(&markers, &final_text))
            }
            Ok(ModelReply::Blocked { reason }) => {
                self.history.rollback_to(base_len);
                ChatReply::blocked(format!("Response blocked due to: {reason}"))
            }
            Ok(_) => {
                self.history.rollback_to(base_len);
                ChatReply::failed(
                    "Error: No summary response after tool execution.".into(),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "follow-up completion failed");
                self.history.rollback_to(base_len);
                ChatReply::failed(format!(
                    "An error occurred while summarizing tool results: {e}"
                ))
            }
        }
    }

    /// Execute one round of tool calls and collect results in request order.
    ///
    /// The calls fan out as concurrent tasks; calls landing on the same
    /// connection serialize on its transport. Every call gets its own
    /// outcome — one failure never aborts the round.
    async fn execute_round(
        &self,
        calls: &[ToolCallRequest],
        markers: &mut Vec<String>,
    ) -> Vec<(ToolResultRecord, ToolOutcome)> {
        for call in calls {
            markers.push(format!(
                "TOOL_CALL_START: {} args={}",
                call.name, call.arguments
            ));
        }

        let outcomes = join_all(
            calls
                .iter()
                .map(|call| dispatch::execute(&self.registry, &call.name, &call.arguments)),
        )
        .await;

        calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| {
                markers.push(format!(
                    "TOOL_CALL_END: {} status={}",
                    call.name,
                    outcome.status_label(&call.name)
                ));
                (
                    ToolResultRecord {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        result: outcome.result_text(&call.name),
                    },
                    outcome,
                )
            })
            .collect()
    }

    /// Hand turns appended during this query to the store, if one is
    /// attached. Store trouble is logged, never surfaced to the caller.
    fn record_new_turns(&self, base_len: usize) {
        let Some((store, session_id)) = &self.store else {
            return;
        };
        for turn in &self.history.turns()[base_len..] {
            if let Err(e) = store.record_turn(session_id, turn) {
                tracing::error!(error = %e, "failed to persist conversation turn");
            }
        }
    }
}

/// Prepend the machine-readable tool markers to the user-visible reply.
fn prefix_markers(markers: &[String], text: &str) -> String {
    if markers.is_empty() {
        text.to_string()
    } else {
        format!("{}\n\n{text}", markers.join("\n"))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
