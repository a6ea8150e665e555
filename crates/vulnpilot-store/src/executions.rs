//! Execution log: append-only audit records for tool invocations.
//!
//! Records are never mutated after insertion; they feed both the history
//! view and execution analysis.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use vulnpilot_core::error::{Error, Result};

use crate::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    /// The process ran to completion (any exit code).
    Completed,
    /// The deadline expired and the process tree was terminated.
    Timeout,
    /// The process never ran (spawn or monitoring failure).
    Failed,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Completed => "completed",
            ExecStatus::Timeout => "timeout",
            ExecStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(ExecStatus::Completed),
            "timeout" => Ok(ExecStatus::Timeout),
            "failed" => Ok(ExecStatus::Failed),
            other => Err(Error::store(format!("unknown execution status '{other}'"))),
        }
    }
}

/// Input for one log append; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub tool_id: String,
    pub params: BTreeMap<String, String>,
    pub argv: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// One immutable execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub tool_id: String,
    pub params: BTreeMap<String, String>,
    pub argv: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn succeeded(&self) -> bool {
        self.status == ExecStatus::Completed && self.exit_code == Some(0)
    }
}

impl Store {
    /// Append an execution record and return it with id and timestamp set.
    pub fn append_execution(&self, new: NewExecution) -> Result<ExecutionRecord> {
        let created_at = Utc::now();
        let params_json = serde_json::to_string(&new.params).map_err(Error::store)?;
        let argv_json = serde_json::to_string(&new.argv).map_err(Error::store)?;
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        conn.execute(
            "INSERT INTO executions
                (tool_id, params, argv, stdout, stderr, status, exit_code, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                new.tool_id,
                params_json,
                argv_json,
                new.stdout,
                new.stderr,
                new.status.as_str(),
                new.exit_code,
                new.duration_ms as i64,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(Error::store)?;
        let id = conn.last_insert_rowid();
        Ok(ExecutionRecord {
            id,
            tool_id: new.tool_id,
            params: new.params,
            argv: new.argv,
            stdout: new.stdout,
            stderr: new.stderr,
            status: new.status,
            exit_code: new.exit_code,
            duration_ms: new.duration_ms,
            created_at,
        })
    }

    /// Most recent execution records, newest first.
    pub fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::store("lock poisoned"))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tool_id, params, argv, stdout, stderr, status, exit_code,
                        duration_ms, created_at
                 FROM executions ORDER BY id DESC LIMIT ?1",
            )
            .map_err(Error::store)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<i32>>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(Error::store)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, tool_id, params_json, argv_json, stdout, stderr, status, exit_code, duration_ms, created_at) =
                row.map_err(Error::store)?;
            records.push(ExecutionRecord {
                id,
                tool_id,
                params: serde_json::from_str(&params_json).map_err(Error::store)?,
                argv: serde_json::from_str(&argv_json).map_err(Error::store)?,
                stdout,
                stderr,
                status: ExecStatus::parse(&status)?,
                exit_code,
                duration_ms: duration_ms as u64,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .map_err(Error::store)?,
            });
        }
        Ok(records)
    }
}
