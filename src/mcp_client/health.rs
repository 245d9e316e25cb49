//! Health monitor — periodic liveness probes for registered servers.
//!
//! One background task per session: every tick it probes all connections
//! concurrently with `tools/list`, waits for every probe to settle, applies
//! status transitions, and sleeps until the next tick. Probes only move
//! status — teardown stays with an explicit `disconnect`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::registry::{display_name, ServerRegistry};
use super::types::ServerStatus;

/// Default spacing between probe rounds.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

// ─── HealthMonitor ───────────────────────────────────────────────────────────

/// Handle to the running monitor task.
pub struct HealthMonitor {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl HealthMonitor {
    /// Spawn the monitor loop on the current runtime.
    pub fn spawn(registry: Arc<Mutex<ServerRegistry>>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval() fires immediately — swallow that so the first
            // probe round happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        tracing::info!("health monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::debug!("running periodic server status check");
                        probe_all(&registry).await;
                    }
                }
            }
        });

        Self {
            handle,
            shutdown_tx,
        }
    }

    /// Cooperatively stop the monitor and wait for the task to finish.
    /// Cancellation is the expected outcome here, not an error.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

// ─── Probe Round ─────────────────────────────────────────────────────────────

/// Probe every registered connection once: fan out, await all, apply
/// transitions.
///
/// Per-connection policy:
/// - probe ok while `Error`  → `Connected` (self-healed, logged)
/// - probe err while `Connected` → `Error` (logged)
/// - anything else → no-op
///
/// A failing probe is an outcome, not a fault — one bad server never blocks
/// the others or the loop.
pub(crate) async fn probe_all(registry: &Mutex<ServerRegistry>) {
    let targets = registry.lock().await.probe_targets();
    if targets.is_empty() {
        return;
    }

    let probes = targets.iter().map(|(_, session)| {
        let session = Arc::clone(session);
        async move { session.list_tools().await.map(|_| ()) }
    });
    let results = join_all(probes).await;

    let mut reg = registry.lock().await;
    for ((identifier, _), result) in targets.iter().zip(results) {
        match result {
            Ok(()) => {
                if reg.status_of(identifier) == Some(ServerStatus::Error) {
                    tracing::info!(
                        server = %display_name(identifier),
                        "server recovered, setting status to connected"
                    );
                    reg.set_status(identifier, ServerStatus::Connected);
                }
            }
            Err(e) => {
                if reg.status_of(identifier) == Some(ServerStatus::Connected) {
                    tracing::warn!(
                        server = %display_name(identifier),
                        error = %e,
                        "server became unresponsive, setting status to error"
                    );
                    reg.set_status(identifier, ServerStatus::Error);
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::registry::connect_session;
    use crate::mcp_client::testing::MockSession;

    #[tokio::test]
    async fn test_probe_marks_unresponsive_server_error() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();

        session.set_healthy(false);
        probe_all(&registry).await;

        assert_eq!(
            registry.lock().await.status_of("calc"),
            Some(ServerStatus::Error)
        );
        // The monitor never removes anything on its own.
        assert_eq!(registry.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_recovers_error_server() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();
        registry
            .lock()
            .await
            .set_status("calc", ServerStatus::Error);

        probe_all(&registry).await;

        assert_eq!(
            registry.lock().await.status_of("calc"),
            Some(ServerStatus::Connected)
        );
    }

    #[tokio::test]
    async fn test_probe_failure_stays_error_and_is_not_removed() {
        let session = MockSession::with_tools(&["add"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "calc", session.clone())
            .await
            .unwrap();
        registry
            .lock()
            .await
            .set_status("calc", ServerStatus::Error);
        session.set_healthy(false);

        probe_all(&registry).await;

        assert_eq!(
            registry.lock().await.status_of("calc"),
            Some(ServerStatus::Error)
        );
        assert!(registry.lock().await.contains("calc"));
    }

    #[tokio::test]
    async fn test_one_failing_probe_does_not_block_others() {
        let bad = MockSession::with_tools(&["add"]);
        let good = MockSession::with_tools(&["mul"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "bad", bad.clone()).await.unwrap();
        connect_session(&registry, "good", good.clone())
            .await
            .unwrap();
        registry
            .lock()
            .await
            .set_status("good", ServerStatus::Error);
        bad.set_healthy(false);

        probe_all(&registry).await;

        let reg = registry.lock().await;
        assert_eq!(reg.status_of("bad"), Some(ServerStatus::Error));
        // The good server still got probed and recovered.
        assert_eq!(reg.status_of("good"), Some(ServerStatus::Connected));
    }

    #[tokio::test]
    async fn test_probe_round_touches_every_connection() {
        let a = MockSession::with_tools(&["t1"]);
        let b = MockSession::with_tools(&["t2"]);
        let registry = Mutex::new(ServerRegistry::new());
        connect_session(&registry, "a", a.clone()).await.unwrap();
        connect_session(&registry, "b", b.clone()).await.unwrap();
        let before_a = a.probe_count();
        let before_b = b.probe_count();

        probe_all(&registry).await;

        assert_eq!(a.probe_count(), before_a + 1);
        assert_eq!(b.probe_count(), before_b + 1);
    }

    #[tokio::test]
    async fn test_shutdown_awaits_monitor_task() {
        let registry = Arc::new(Mutex::new(ServerRegistry::new()));
        let monitor =
            HealthMonitor::spawn(Arc::clone(&registry), Duration::from_millis(10));
        // Give the loop a moment to start, then stop it cleanly.
        tokio::time::sleep(Duration::from_millis(5)).await;
        monitor.shutdown().await;
    }
}
