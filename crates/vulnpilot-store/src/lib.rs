//! Persistence for the dispatch pipeline.
//!
//! One SQLite database backs three logically distinct stores with different
//! consistency rules:
//!   - `tools`: read-mostly keyed registry, written only via approval/seed
//!   - `requests`: ordered tool-request log with a one-shot state machine
//!   - `executions`: append-only execution records
//!
//! All writes go through a single mutex-guarded connection (single-writer
//! discipline); readers work off cached registry snapshots invalidated on
//! write.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::Connection;

use vulnpilot_core::error::{Error, Result};

mod executions;
mod registry;
mod requests;

pub use executions::{ExecStatus, ExecutionRecord, NewExecution};
pub use registry::RegistrySnapshot;
pub use requests::{Decision, RequestStatus, ToolRequest};

pub struct Store {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) registry_cache: RwLock<Option<Arc<RegistrySnapshot>>>,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(Error::store)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::store)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(Error::store)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(Error::store)?;
        ensure_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry_cache: RwLock::new(None),
        })
    }
}

/// Create all tables (idempotent, called on every open).
fn ensure_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tools (
            id TEXT PRIMARY KEY,
            descriptor TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS requests (
            id TEXT PRIMARY KEY,
            proposed TEXT NOT NULL,
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            decided_at TEXT
        );

        CREATE TABLE IF NOT EXISTS executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tool_id TEXT NOT NULL,
            params TEXT NOT NULL,
            argv TEXT NOT NULL,
            stdout TEXT NOT NULL,
            stderr TEXT NOT NULL,
            status TEXT NOT NULL,
            exit_code INTEGER,
            duration_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
        CREATE INDEX IF NOT EXISTS idx_executions_tool ON executions(tool_id);
        CREATE INDEX IF NOT EXISTS idx_executions_ts ON executions(created_at);
        "#,
    )
    .map_err(Error::store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use vulnpilot_core::tool::{ParamKind, ToolDescriptor};

    use super::*;

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("vulnpilot.sqlite");

        let descriptor = ToolDescriptor {
            id: "nmap".to_string(),
            name: "Nmap".to_string(),
            description: "Network scanner".to_string(),
            command: "nmap -sV {target}".to_string(),
            params: [("target".to_string(), ParamKind::Target)].into(),
            default_param: "target".to_string(),
            category: "network".to_string(),
            trigger_phrases: vec![],
            usage_example: None,
        };

        {
            let store = Store::open(&db_path).unwrap();
            assert!(store.insert_tool_if_absent(&descriptor).unwrap());
        }

        let reopened = Store::open(&db_path).unwrap();
        let loaded = reopened.tool("nmap").unwrap().unwrap();
        assert_eq!(loaded, descriptor);
    }
}
