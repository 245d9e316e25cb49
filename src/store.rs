//! SQLite conversation persistence.
//!
//! Uses `rusqlite` in synchronous mode — the session hands finished turns
//! over right after a query completes, and the writes are small. The store
//! is optional: a session without one behaves identically, it just forgets
//! everything on drop.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::backend::{Turn, TurnRole};

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// One stored chat session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub turn_count: i64,
}

// ─── ConversationStore ───────────────────────────────────────────────────────

/// Append-only store of finished conversation turns.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                title      TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS turns (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id),
                role       TEXT NOT NULL,
                payload    TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_session
                ON turns(session_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a new session id.
    pub fn create_session(&self, id: &str, title: Option<&str>) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO sessions (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![id, title, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Append one finished turn to a session.
    pub fn record_turn(&self, session_id: &str, turn: &Turn) -> Result<(), StoreError> {
        let payload = serde_json::to_string(turn)?;
        self.conn.lock().unwrap().execute(
            "INSERT INTO turns (session_id, role, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                role_label(turn.role),
                payload,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// All turns of a session, in insertion (chronological) order.
    pub fn turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT payload FROM turns WHERE session_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;

        let mut turns = Vec::new();
        for payload in rows {
            turns.push(serde_json::from_str(&payload?)?);
        }
        Ok(turns)
    }

    /// All stored sessions, newest first.
    pub fn sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.title, s.created_at,
                    (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id)
             FROM sessions s
             ORDER BY s.created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                turn_count: row.get(3)?,
            })
        })?;

        let mut sessions = Vec::new();
        for record in rows {
            sessions.push(record?);
        }
        Ok(sessions)
    }
}

fn role_label(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
        TurnRole::Tool => "tool",
        TurnRole::System => "system",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
