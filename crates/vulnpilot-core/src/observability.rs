//! Observability: tracing init and the append-only JSONL audit log.
//!
//! Uses config::ObservabilityConfig for VULNPILOT_QUIET, LOG_LEVEL,
//! LOG_JSON and AUDIT_LOG.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Initialize tracing. Call once at process startup.
/// When VULNPILOT_QUIET=1, only WARN and above are logged.
pub fn init_tracing() {
    let cfg = crate::config::ObservabilityConfig::from_env();
    let level: String = if cfg.quiet {
        "vulnpilot=warn".to_string()
    } else {
        cfg.log_level.clone()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn audit_path() -> Option<String> {
    let path = crate::config::ObservabilityConfig::from_env()
        .audit_log
        .clone()?;
    if let Some(parent) = Path::new(&path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    Some(path)
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Audit: execution_started (emitted right before the process spawn).
pub fn audit_execution_started(tool_id: &str, program: &str, args: &[String]) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "execution_started",
            "tool_id": tool_id,
            "program": program,
            "args": args,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: execution_completed (covers success, failure and timeout).
pub fn audit_execution_completed(
    tool_id: &str,
    status: &str,
    exit_code: Option<i32>,
    duration_ms: u64,
) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "execution_completed",
            "tool_id": tool_id,
            "status": status,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: request_decided (approve/reject on a pending tool request).
pub fn audit_request_decided(request_id: &str, tool_id: &str, action: &str) {
    tracing::info!(
        request_id = %request_id,
        tool_id = %tool_id,
        action = %action,
        "tool request decided"
    );
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "event": "request_decided",
            "request_id": request_id,
            "tool_id": tool_id,
            "action": action,
        });
        append_jsonl(&path, &record);
    }
}
