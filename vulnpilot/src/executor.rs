//! Tool execution: render a command template, spawn it as an argv vector,
//! enforce the deadline, and persist the record win or lose.
//!
//! The rendered command is always invoked as program + argument vector,
//! never interpolated into a shell line. Stdout/stderr are read on
//! background threads while the process runs; without this a child writing
//! more than the pipe buffer would block and the monitor would deadlock.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use vulnpilot_core::config::ExecutionConfig;
use vulnpilot_core::error::{Error, Result};
use vulnpilot_core::observability;
use vulnpilot_core::tool::{canonical_id, placeholders, ToolDescriptor};
use vulnpilot_store::{ExecStatus, ExecutionRecord, NewExecution, Store};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command template rendered against a parameter map.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RenderedCommand {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Substitute every placeholder with its parameter value, token by token.
/// Any placeholder left unsubstituted fails before a process exists.
pub fn render_command(
    descriptor: &ToolDescriptor,
    params: &BTreeMap<String, String>,
) -> Result<RenderedCommand> {
    let mut tokens: Vec<String> = Vec::new();
    for raw_token in descriptor.command.split_whitespace() {
        let mut token = raw_token.to_string();
        for (slot, value) in params {
            token = token.replace(&format!("{{{slot}}}"), value);
        }
        let leftover = placeholders(&token);
        if !leftover.is_empty() {
            return Err(Error::validation(format!(
                "unfilled placeholder(s) in command for '{}': {}",
                descriptor.id,
                leftover.join(", ")
            )));
        }
        tokens.push(token);
    }
    let mut tokens = tokens.into_iter();
    let program = tokens
        .next()
        .ok_or_else(|| Error::validation(format!("empty command template for '{}'", descriptor.id)))?;
    Ok(RenderedCommand {
        program,
        args: tokens.collect(),
    })
}

// ─── Per-tool concurrency gate ──────────────────────────────────────────────

/// Bounds concurrent executions per tool id; different tools never block
/// each other.
pub struct ToolGate {
    active: Mutex<HashMap<String, usize>>,
    freed: Condvar,
    cap: usize,
}

pub struct ToolSlot<'a> {
    gate: &'a ToolGate,
    tool_id: String,
}

impl ToolGate {
    pub fn new(cap: usize) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            freed: Condvar::new(),
            cap: cap.max(1),
        }
    }

    /// Block until a slot for this tool frees up.
    pub fn acquire(&self, tool_id: &str) -> ToolSlot<'_> {
        let tool_id = canonical_id(tool_id);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        while active.get(&tool_id).copied().unwrap_or(0) >= self.cap {
            active = self
                .freed
                .wait(active)
                .unwrap_or_else(|e| e.into_inner());
        }
        *active.entry(tool_id.clone()).or_insert(0) += 1;
        ToolSlot { gate: self, tool_id }
    }
}

impl Drop for ToolSlot<'_> {
    fn drop(&mut self) {
        let mut active = self
            .gate
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(count) = active.get_mut(&self.tool_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&self.tool_id);
            }
        }
        self.gate.freed.notify_all();
    }
}

// ─── Process monitoring ─────────────────────────────────────────────────────

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    // The child was spawned as its own process group leader, so this takes
    // out descendants as well.
    let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Wait for the child with a deadline. Returns
/// (stdout, stderr, exit_code, timed_out).
fn wait_with_deadline(
    child: &mut Child,
    timeout_secs: u64,
) -> Result<(String, String, Option<i32>, bool)> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = out.read_to_string(&mut s);
            s
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = err.read_to_string(&mut s);
            s
        })
    });

    let join = |handle: Option<thread::JoinHandle<String>>| {
        handle
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default()
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = join(stdout_handle);
                let stderr = join(stderr_handle);
                return Ok((stdout, stderr, status.code(), false));
            }
            Ok(None) => {}
            Err(e) => {
                kill_process_tree(child);
                let _ = child.wait();
                let _ = join(stdout_handle);
                let _ = join(stderr_handle);
                return Err(Error::Io(e));
            }
        }

        if start.elapsed() > timeout {
            kill_process_tree(child);
            let _ = child.wait();
            let stdout = join(stdout_handle);
            let mut stderr = join(stderr_handle);
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "Process killed: exceeded timeout of {timeout_secs} seconds"
            ));
            return Ok((stdout, stderr, None, true));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

// ─── Execution entry points ─────────────────────────────────────────────────

/// Look up the descriptor and execute. The registry read is a snapshot;
/// only the registration workflow writes it.
pub fn execute_tool(
    store: &Store,
    gate: &ToolGate,
    config: &ExecutionConfig,
    tool_id: &str,
    params: &BTreeMap<String, String>,
) -> Result<ExecutionRecord> {
    let descriptor = store
        .tool(tool_id)?
        .ok_or_else(|| Error::NotFound(canonical_id(tool_id)))?;
    execute(store, gate, config, &descriptor, params)
}

/// Render and run one tool invocation. Nonzero exit and timeout come back
/// as records, not errors; only pre-spawn validation and spawn failures
/// error out, and spawn failures still leave a record behind.
pub fn execute(
    store: &Store,
    gate: &ToolGate,
    config: &ExecutionConfig,
    descriptor: &ToolDescriptor,
    params: &BTreeMap<String, String>,
) -> Result<ExecutionRecord> {
    let rendered = render_command(descriptor, params)?;
    let argv = rendered.argv();

    let _slot = gate.acquire(&descriptor.id);
    observability::audit_execution_started(&descriptor.id, &rendered.program, &rendered.args);
    tracing::info!(tool_id = %descriptor.id, program = %rendered.program, "spawning tool process");

    let start = Instant::now();
    let mut command = Command::new(&rendered.program);
    command
        .args(&rendered.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let record = store.append_execution(NewExecution {
                tool_id: descriptor.id.clone(),
                params: params.clone(),
                argv,
                stdout: String::new(),
                stderr: format!("failed to spawn '{}': {e}", rendered.program),
                status: ExecStatus::Failed,
                exit_code: None,
                duration_ms,
            })?;
            observability::audit_execution_completed(
                &descriptor.id,
                record.status.as_str(),
                None,
                duration_ms,
            );
            tracing::error!(tool_id = %descriptor.id, err = %e, "spawn failed");
            return Err(Error::Execution {
                tool_id: descriptor.id.clone(),
                message: e.to_string(),
            });
        }
    };

    let (stdout, stderr, exit_code, timed_out) =
        match wait_with_deadline(&mut child, config.timeout_secs) {
            Ok(outcome) => outcome,
            Err(e) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                store.append_execution(NewExecution {
                    tool_id: descriptor.id.clone(),
                    params: params.clone(),
                    argv,
                    stdout: String::new(),
                    stderr: format!("process monitoring failed: {e}"),
                    status: ExecStatus::Failed,
                    exit_code: None,
                    duration_ms,
                })?;
                observability::audit_execution_completed(
                    &descriptor.id,
                    ExecStatus::Failed.as_str(),
                    None,
                    duration_ms,
                );
                return Err(Error::Execution {
                    tool_id: descriptor.id.clone(),
                    message: e.to_string(),
                });
            }
        };
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = if timed_out {
        ExecStatus::Timeout
    } else {
        ExecStatus::Completed
    };

    let record = store.append_execution(NewExecution {
        tool_id: descriptor.id.clone(),
        params: params.clone(),
        argv,
        stdout,
        stderr,
        status,
        exit_code,
        duration_ms,
    })?;
    observability::audit_execution_completed(
        &descriptor.id,
        record.status.as_str(),
        exit_code,
        duration_ms,
    );
    tracing::info!(
        tool_id = %descriptor.id,
        status = record.status.as_str(),
        exit_code = ?exit_code,
        duration_ms,
        "tool process finished"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use vulnpilot_core::tool::ParamKind;

    use super::*;

    fn descriptor(id: &str, command: &str, params: &[(&str, ParamKind)]) -> ToolDescriptor {
        ToolDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            description: format!("{id} test tool"),
            command: command.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            default_param: "target".to_string(),
            category: "other".to_string(),
            trigger_phrases: vec![],
            usage_example: None,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_fills_every_placeholder() {
        let d = descriptor(
            "nuclei",
            "nuclei -u {url} -severity {level}",
            &[("url", ParamKind::Url), ("level", ParamKind::Custom)],
        );
        let rendered = render_command(
            &d,
            &params(&[("url", "https://example.com"), ("level", "high")]),
        )
        .unwrap();
        assert_eq!(rendered.program, "nuclei");
        assert_eq!(
            rendered.args,
            vec!["-u", "https://example.com", "-severity", "high"]
        );
        for arg in &rendered.args {
            assert!(!arg.contains('{'), "leftover placeholder in {arg}");
        }
    }

    #[test]
    fn test_render_fails_on_missing_parameter() {
        let d = descriptor("nuclei", "nuclei -u {url}", &[("url", ParamKind::Url)]);
        let err = render_command(&d, &params(&[])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got: {err}");
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn test_gate_caps_per_tool_only() {
        let gate = ToolGate::new(1);
        let slot = gate.acquire("nmap");
        // A different tool is not blocked by nmap's slot.
        let other = gate.acquire("nuclei");
        drop(other);
        drop(slot);
        // Slot freed: acquiring again must not deadlock.
        let _again = gate.acquire("nmap");
    }

    #[test]
    fn test_execute_captures_stdout() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let config = ExecutionConfig {
            timeout_secs: 10,
            max_concurrent_per_tool: 2,
        };
        let d = descriptor("echoer", "echo {target}", &[("target", ParamKind::Target)]);
        let record = execute(&store, &gate, &config, &d, &params(&[("target", "example.com")]))
            .unwrap();
        assert!(record.succeeded());
        assert_eq!(record.stdout.trim(), "example.com");
        assert_eq!(store.recent_executions(5).unwrap().len(), 1);
    }

    #[test]
    fn test_nonzero_exit_is_a_record_not_an_error() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let config = ExecutionConfig {
            timeout_secs: 10,
            max_concurrent_per_tool: 2,
        };
        let d = descriptor("falser", "false", &[]);
        let record = execute(&store, &gate, &config, &d, &BTreeMap::new()).unwrap();
        assert_eq!(record.status, ExecStatus::Completed);
        assert_ne!(record.exit_code, Some(0));
        assert!(!record.succeeded());
    }

    #[test]
    fn test_timeout_kills_and_records() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let config = ExecutionConfig {
            timeout_secs: 1,
            max_concurrent_per_tool: 2,
        };
        let d = descriptor("sleeper", "sleep {target}", &[("target", ParamKind::Target)]);
        let start = Instant::now();
        let record =
            execute(&store, &gate, &config, &d, &params(&[("target", "30")])).unwrap();
        assert!(start.elapsed() < Duration::from_secs(10), "did not respect deadline");
        assert_eq!(record.status, ExecStatus::Timeout);
        assert!(record.stderr.contains("exceeded timeout"));
        // The record is persisted like any other.
        let recent = store.recent_executions(5).unwrap();
        assert_eq!(recent[0].status, ExecStatus::Timeout);
    }

    #[test]
    fn test_spawn_failure_persists_failed_record() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let config = ExecutionConfig {
            timeout_secs: 5,
            max_concurrent_per_tool: 2,
        };
        let d = descriptor("ghost", "definitely-not-a-real-binary-xyz {target}", &[(
            "target",
            ParamKind::Target,
        )]);
        let err = execute(&store, &gate, &config, &d, &params(&[("target", "x")])).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }), "got: {err}");
        let recent = store.recent_executions(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].status, ExecStatus::Failed);
    }

    #[test]
    fn test_execute_tool_unknown_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let config = ExecutionConfig::default();
        let err = execute_tool(&store, &gate, &config, "nope", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "got: {err}");
    }
}
