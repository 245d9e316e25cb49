//! Server registry — owns tool-server connections and the tool-name index.
//!
//! Invariants:
//! - A tool name belongs to at most one connection (first registration wins;
//!   later duplicates are skipped with a warning).
//! - A connection identifier is registered at most once.
//! - A connection either exists fully (session open, tools indexed) or not
//!   at all — `connect` releases everything it acquired on any failure.
//!
//! All mutation happens on the session's single consumer task; the registry
//! itself is plain data behind a `tokio::sync::Mutex`, and the async
//! lifecycle front-doors (`connect`, `disconnect`, `cleanup_all`) hold that
//! lock only around map mutation, never across process or transport I/O.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::errors::McpError;
use super::session::{spawn_session, ToolServerSession};
use super::types::{ConnectionSnapshot, LaunchSpec, ServerStatus, ToolDescriptor};

// ─── ServerConnection ────────────────────────────────────────────────────────

/// One registered tool-server connection.
pub struct ServerConnection {
    pub identifier: String,
    /// How the server was launched (retained for presentation and restarts).
    pub launch: LaunchSpec,
    session: Arc<dyn ToolServerSession>,
    pub status: ServerStatus,
    /// Tool names this connection owns (conflict losers excluded).
    tools: Vec<String>,
    /// Descriptors for the owned tools, in discovery order.
    descriptors: Vec<ToolDescriptor>,
}

impl ServerConnection {
    /// The session handle, shared so calls can run outside the registry lock.
    pub fn session(&self) -> Arc<dyn ToolServerSession> {
        Arc::clone(&self.session)
    }

    /// Tool names owned by this connection.
    pub fn tool_names(&self) -> &[String] {
        &self.tools
    }
}

/// Short human-readable name for an identifier: the file name for path-like
/// identifiers, the identifier itself otherwise.
pub fn display_name(identifier: &str) -> String {
    if identifier.contains('/') || identifier.contains('\\') {
        std::path::Path::new(identifier)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| identifier.to_string())
    } else {
        identifier.to_string()
    }
}

// ─── ServerRegistry ──────────────────────────────────────────────────────────

/// Registry of live connections plus the global tool-name index.
pub struct ServerRegistry {
    connections: HashMap<String, ServerConnection>,
    /// `tool name → owning connection identifier`.
    tool_owners: HashMap<String, String>,
    /// Bumped on every change to the tool set. Declaration caches compare
    /// against this instead of sharing a dirty bit.
    generation: u64,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            tool_owners: HashMap::new(),
            generation: 0,
        }
    }

    /// Current tool-set generation. Moves whenever tools are added or removed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.connections.contains_key(identifier)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of registered tools across all connections.
    pub fn tool_count(&self) -> usize {
        self.tool_owners.len()
    }

    /// The identifier owning a tool name, if registered.
    pub fn owner_of(&self, tool_name: &str) -> Option<&str> {
        self.tool_owners.get(tool_name).map(|s| s.as_str())
    }

    pub fn connection(&self, identifier: &str) -> Option<&ServerConnection> {
        self.connections.get(identifier)
    }

    pub fn status_of(&self, identifier: &str) -> Option<ServerStatus> {
        self.connections.get(identifier).map(|c| c.status)
    }

    /// Update a connection's status, returning the previous value.
    ///
    /// `None` when the connection has been removed in the meantime — callers
    /// that resolved a session earlier just drop the update.
    pub fn set_status(
        &mut self,
        identifier: &str,
        status: ServerStatus,
    ) -> Option<ServerStatus> {
        self.connections.get_mut(identifier).map(|conn| {
            let previous = conn.status;
            conn.status = status;
            previous
        })
    }

    /// Resolve a tool to its owning connection's identifier and session.
    pub fn session_for_tool(
        &self,
        tool_name: &str,
    ) -> Option<(String, Arc<dyn ToolServerSession>)> {
        let owner = self.tool_owners.get(tool_name)?;
        let conn = self.connections.get(owner)?;
        Some((owner.clone(), conn.session()))
    }

    /// `(identifier, session)` pairs for every connection — the health
    /// monitor's fan-out input.
    pub fn probe_targets(&self) -> Vec<(String, Arc<dyn ToolServerSession>)> {
        self.connections
            .values()
            .map(|c| (c.identifier.clone(), c.session()))
            .collect()
    }

    /// All registered tool descriptors, sorted by name so declaration
    /// output is deterministic.
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .connections
            .values()
            .flat_map(|c| c.descriptors.iter().cloned())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Read-only snapshot for presentation, sorted by identifier.
    pub fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let mut entries: Vec<ConnectionSnapshot> = self
            .connections
            .values()
            .map(|c| ConnectionSnapshot {
                identifier: c.identifier.clone(),
                display_name: display_name(&c.identifier),
                tools: c.tools.clone(),
                status: c.status,
            })
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        entries
    }

    /// Register a fully established session and index its tools.
    ///
    /// Duplicate tool names are skipped (the original owner keeps them) and
    /// logged; the returned list contains only the names actually added.
    pub fn register(
        &mut self,
        identifier: &str,
        launch: LaunchSpec,
        session: Arc<dyn ToolServerSession>,
        discovered: Vec<ToolDescriptor>,
    ) -> Result<Vec<String>, McpError> {
        if self.connections.contains_key(identifier) {
            return Err(McpError::AlreadyConnected {
                identifier: identifier.to_string(),
            });
        }

        let mut added = Vec::new();
        let mut descriptors = Vec::new();
        for tool in discovered {
            if let Some(owner) = self.tool_owners.get(&tool.name) {
                tracing::warn!(
                    tool = %tool.name,
                    owner = %owner,
                    skipped_from = %identifier,
                    "tool name conflict — keeping the original owner"
                );
                continue;
            }
            self.tool_owners
                .insert(tool.name.clone(), identifier.to_string());
            added.push(tool.name.clone());
            descriptors.push(tool);
        }

        self.connections.insert(
            identifier.to_string(),
            ServerConnection {
                identifier: identifier.to_string(),
                launch,
                session,
                status: ServerStatus::Connected,
                tools: added.clone(),
                descriptors,
            },
        );

        if !added.is_empty() {
            self.generation += 1;
        }

        tracing::info!(
            server = %display_name(identifier),
            tools = ?added,
            "registered tool server"
        );
        Ok(added)
    }

    /// Remove a connection, dropping every tool it owns.
    ///
    /// Returns the removed connection so the caller can close its session
    /// outside the registry lock.
    pub fn remove(&mut self, identifier: &str) -> Result<ServerConnection, McpError> {
        let conn = self
            .connections
            .remove(identifier)
            .ok_or_else(|| McpError::NotFound {
                identifier: identifier.to_string(),
            })?;

        for tool in &conn.tools {
            self.tool_owners.remove(tool);
        }
        if !conn.tools.is_empty() {
            self.generation += 1;
        }

        tracing::info!(
            server = %display_name(identifier),
            removed_tools = ?conn.tools,
            "unregistered tool server"
        );
        Ok(conn)
    }

    /// Identifiers of all registered connections.
    pub fn identifiers(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Lifecycle Front-Doors ───────────────────────────────────────────────────

/// Connect a tool server: spawn, initialize, discover, register.
///
/// The registry lock is held only for the duplicate check and the final
/// registration — spawn and discovery I/O run unlocked so health probes and
/// in-flight tool calls keep moving during a slow server startup.
pub async fn connect(
    registry: &Mutex<ServerRegistry>,
    identifier: &str,
    spec: LaunchSpec,
) -> Result<Vec<String>, McpError> {
    if registry.lock().await.contains(identifier) {
        return Err(McpError::AlreadyConnected {
            identifier: identifier.to_string(),
        });
    }

    let session = spawn_session(identifier, &spec).await?;

    let discovered = match session.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            session.close().await;
            return Err(McpError::ConnectFailed {
                identifier: identifier.to_string(),
                reason: format!("tool discovery failed: {e}"),
            });
        }
    };

    tracing::info!(
        server = %display_name(identifier),
        tools = ?discovered.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "discovered tools"
    );

    let mut reg = registry.lock().await;
    match reg.register(identifier, spec, Arc::clone(&session), discovered) {
        Ok(added) => Ok(added),
        Err(e) => {
            // Lost a connect race for the same identifier — release the
            // session we spawned so nothing half-registered survives.
            drop(reg);
            session.close().await;
            Err(e)
        }
    }
}

/// Register an already-established session (tests, in-process providers).
pub async fn connect_session(
    registry: &Mutex<ServerRegistry>,
    identifier: &str,
    session: Arc<dyn ToolServerSession>,
) -> Result<Vec<String>, McpError> {
    let discovered = session
        .list_tools()
        .await
        .map_err(|e| McpError::ConnectFailed {
            identifier: identifier.to_string(),
            reason: format!("tool discovery failed: {e}"),
        })?;

    registry.lock().await.register(
        identifier,
        LaunchSpec::new("<in-process>", Vec::new()),
        session,
        discovered,
    )
}

/// Disconnect a server: unregister, then close its session (killing the
/// child). A second disconnect reports `NotFound` rather than crashing.
pub async fn disconnect(
    registry: &Mutex<ServerRegistry>,
    identifier: &str,
) -> Result<(), McpError> {
    let conn = registry.lock().await.remove(identifier)?;
    conn.session().close().await;
    Ok(())
}

/// Disconnect every connection, best-effort.
///
/// Attempts each one regardless of earlier failures and returns whatever
/// went wrong, paired with the identifier. Trivially succeeds on an empty
/// registry and is safe to call repeatedly.
pub async fn cleanup_all(registry: &Mutex<ServerRegistry>) -> Vec<(String, McpError)> {
    let identifiers = registry.lock().await.identifiers();
    let mut failures = Vec::new();
    for identifier in identifiers {
        if let Err(e) = disconnect(registry, &identifier).await {
            tracing::error!(server = %identifier, error = %e, "cleanup failed");
            failures.push((identifier, e));
        }
    }
    failures
}

// ─── Tests ───────────────────────────────────────────────────────────────────
