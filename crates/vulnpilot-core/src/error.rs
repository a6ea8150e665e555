//! Error taxonomy shared across the pipeline.
//!
//! Expected conditions ("tool not configured", "request already decided")
//! are variants the caller inspects, not faults. Upstream failures carry
//! enough context to log but are expected to degrade gracefully at the
//! resolution layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Tool id not present in the registry, or an unknown request id.
    #[error("'{0}' not found")]
    NotFound(String),

    /// Missing descriptor fields, unrendered placeholders, duplicate
    /// registration name: anything rejected before a side effect happens.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The child process could not be spawned or monitored.
    #[error("execution failed for '{tool_id}': {message}")]
    Execution { tool_id: String, message: String },

    /// Deadline expired; the process tree was terminated.
    #[error("'{tool_id}' timed out after {timeout_secs}s")]
    Timeout { tool_id: String, timeout_secs: u64 },

    /// External classifier/summarizer call failed or returned an invalid
    /// shape. Callers in the resolution path degrade this to a non-match.
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// Decision on an already-terminal request, or a concurrent write race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence-layer failure (SQLite).
    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into())
    }

    pub fn store(msg: impl std::fmt::Display) -> Self {
        Error::Store(msg.to_string())
    }
}
