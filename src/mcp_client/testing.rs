//! Scripted in-process sessions for tests.
//!
//! `MockSession` stands in for a spawned tool-server process: it advertises
//! a fixed tool list, answers calls from a canned response table, and can be
//! flipped unhealthy to exercise failure and self-healing paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::McpError;
use super::session::ToolServerSession;
use super::types::ToolDescriptor;

/// A scripted tool-server session.
pub struct MockSession {
    identifier: String,
    tools: Vec<ToolDescriptor>,
    /// Canned results by tool name; unlisted tools echo `"{name} ok"`.
    responses: HashMap<String, String>,
    healthy: AtomicBool,
    closed: AtomicBool,
    calls: AtomicUsize,
    probes: AtomicUsize,
}

impl MockSession {
    /// Session advertising `names` as tools with empty object schemas.
    pub fn with_tools(names: &[&str]) -> Arc<Self> {
        let tools = names
            .iter()
            .map(|name| ToolDescriptor {
                name: name.to_string(),
                description: format!("Test tool: {name}"),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {}
                }),
            })
            .collect();
        Arc::new(Self {
            identifier: "mock".to_string(),
            tools,
            responses: HashMap::new(),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    /// Session advertising fully specified descriptors.
    pub fn with_descriptors(tools: Vec<ToolDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            identifier: "mock".to_string(),
            tools,
            responses: HashMap::new(),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    /// Set the canned result for one tool.
    pub fn respond_with(self: Arc<Self>, tool: &str, content: &str) -> Arc<Self> {
        // Arc juggling: only used during test setup, before sharing.
        let mut this = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("session already shared"));
        this.responses.insert(tool.to_string(), content.to_string());
        Arc::new(this)
    }

    /// Flip the session healthy/unhealthy. Unhealthy sessions fail every
    /// probe and call with a transport error.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of `call_tool` invocations observed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `list_tools` invocations observed (incl. discovery).
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn check_healthy(&self) -> Result<(), McpError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(McpError::Transport {
                identifier: self.identifier.clone(),
                reason: "mock session unhealthy".into(),
            })
        }
    }
}

#[async_trait]
impl ToolServerSession for MockSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check_healthy()?;
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        _args: &serde_json::Value,
    ) -> Result<String, McpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_healthy()?;
        Ok(self
            .responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{name} ok")))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
