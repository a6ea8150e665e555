//! Chat dispatch: one message in, one reply out.
//!
//! Resolution → extraction → execution → optional analysis, with every
//! failure shaped into reply text instead of an unhandled fault. The reply
//! mirrors the chat contract of reply text plus an optional execution
//! payload.

use vulnpilot_agent::extract;
use vulnpilot_agent::intent::{self, Intent};
use vulnpilot_agent::llm::{analysis, LlmClient};
use vulnpilot_core::config::ExecutionConfig;
use vulnpilot_core::error::Error;
use vulnpilot_store::{ExecStatus, ExecutionRecord, Store};

use crate::executor::{self, ToolGate};
use crate::workflow::{self, SubmitOutcome};

/// Reply to one operator message.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    /// Present when a tool actually ran; carries the full record.
    pub execution: Option<ExecutionRecord>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            execution: None,
        }
    }
}

pub struct Dispatcher<'a> {
    pub store: &'a Store,
    pub gate: &'a ToolGate,
    pub config: ExecutionConfig,
    pub llm: Option<LlmClient>,
}

impl Dispatcher<'_> {
    pub async fn handle_message(&self, message: &str) -> Reply {
        if message.trim().is_empty() {
            return Reply::text("Please provide a message.");
        }

        let registry = match self.store.registry_snapshot() {
            Ok(registry) => registry,
            Err(e) => {
                tracing::error!(err = %e, stage = "registry", "failed to load registry");
                return Reply::text("The tool registry is unavailable right now.");
            }
        };

        let intent = intent::resolve_with_fallback(message, &registry, self.llm.as_ref()).await;
        match intent {
            Intent::Execute {
                tool_id,
                raw_target,
            } => self.run_tool(&tool_id, &raw_target).await,
            Intent::AddTool { proposed } => self.queue_tool(proposed, message),
            Intent::Clarify { missing_fields } => Reply::text(format!(
                "I can queue that tool for review, but I still need: {}. \
                 Tell me, for example: \"The command to run it is: mytool -u {{url}}. \
                 It's a web scanner.\"",
                missing_fields.join(", ")
            )),
            Intent::None => {
                let known: Vec<&str> = registry.keys().take(5).map(String::as_str).collect();
                if known.is_empty() {
                    Reply::text(
                        "I couldn't map that to a tool command, and no tools are registered yet. \
                         Seed the catalog with `vulnpilot tools seed`.",
                    )
                } else {
                    Reply::text(format!(
                        "I couldn't map that to a tool command. Try something like \
                         \"run nmap on example.com\". Known tools: {}.",
                        known.join(", ")
                    ))
                }
            }
        }
    }

    async fn run_tool(&self, tool_id: &str, raw_target: &str) -> Reply {
        let descriptor = match self.store.tool(tool_id) {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                tracing::warn!(tool_id = %tool_id, stage = "lookup", "resolved tool vanished from registry");
                return Reply::text(format!("I don't have a tool called '{tool_id}'."));
            }
            Err(e) => {
                tracing::error!(tool_id = %tool_id, stage = "lookup", err = %e, "registry read failed");
                return Reply::text("The tool registry is unavailable right now.");
            }
        };

        let params = extract::extract(&descriptor.params, &descriptor.default_param, raw_target);
        let record = match executor::execute_tool(
            self.store,
            self.gate,
            &self.config,
            &descriptor.id,
            &params,
        ) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(tool_id = %descriptor.id, stage = "execute", err = %e, "execution failed");
                let text = match e {
                    Error::Validation(msg) => {
                        format!("I couldn't run {}: {msg}", descriptor.name)
                    }
                    Error::Execution { message, .. } => format!(
                        "I couldn't start {}: {message}. Is it installed?",
                        descriptor.name
                    ),
                    other => format!("Running {} failed: {other}", descriptor.name),
                };
                return Reply::text(text);
            }
        };

        let header = match record.status {
            ExecStatus::Completed if record.succeeded() => format!(
                "Ran {} against {} in {} ms.",
                descriptor.name, raw_target, record.duration_ms
            ),
            ExecStatus::Completed => format!(
                "Ran {} against {}; it exited with code {}. Stderr is included in the output.",
                descriptor.name,
                raw_target,
                record
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            ExecStatus::Timeout => format!(
                "{} timed out after {} seconds and was terminated; partial output is included.",
                descriptor.name, self.config.timeout_secs
            ),
            ExecStatus::Failed => format!("{} could not be started.", descriptor.name),
        };

        let mut text = header;
        if let Some(narrative) = analysis::narrative(self.llm.as_ref(), &record).await {
            text.push_str("\n\n");
            text.push_str(&narrative);
        }

        Reply {
            text,
            execution: Some(record),
        }
    }

    fn queue_tool(&self, proposed: vulnpilot_core::tool::ToolDescriptor, message: &str) -> Reply {
        let name = proposed.name.clone();
        match workflow::submit(self.store, proposed, message) {
            Ok(SubmitOutcome::Created(request)) => Reply::text(format!(
                "Submitted '{name}' for admin review. Request id: {}. \
                 An administrator can decide it with `vulnpilot requests approve {}`.",
                request.id, request.id
            )),
            Ok(SubmitOutcome::AlreadyExists(id)) => {
                Reply::text(format!("Tool '{id}' already exists."))
            }
            Err(Error::Validation(msg)) => {
                tracing::warn!(stage = "submit", err = %msg, "proposal rejected");
                Reply::text(format!("That tool definition isn't usable yet: {msg}"))
            }
            Err(e) => {
                tracing::error!(stage = "submit", err = %e, "request creation failed");
                Reply::text("I couldn't record that tool request.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use vulnpilot_core::tool::{ParamKind, ToolDescriptor};

    use super::*;

    fn echoer() -> ToolDescriptor {
        ToolDescriptor {
            id: "echoer".to_string(),
            name: "Echoer".to_string(),
            description: "Echoes its target".to_string(),
            command: "echo {target}".to_string(),
            params: [("target".to_string(), ParamKind::Target)]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
            default_param: "target".to_string(),
            category: "other".to_string(),
            trigger_phrases: vec![],
            usage_example: None,
        }
    }

    fn dispatcher<'a>(store: &'a Store, gate: &'a ToolGate) -> Dispatcher<'a> {
        Dispatcher {
            store,
            gate,
            config: ExecutionConfig {
                timeout_secs: 10,
                max_concurrent_per_tool: 2,
            },
            llm: None,
        }
    }

    #[tokio::test]
    async fn test_empty_message() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate).handle_message("  ").await;
        assert_eq!(reply.text, "Please provide a message.");
        assert!(reply.execution.is_none());
    }

    #[tokio::test]
    async fn test_run_flow_produces_execution() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tool_if_absent(&echoer()).unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate)
            .handle_message("run echoer on example.com")
            .await;
        let record = reply.execution.expect("expected an execution");
        assert_eq!(record.tool_id, "echoer");
        assert_eq!(record.stdout.trim(), "example.com");
        assert!(reply.text.contains("Ran Echoer against example.com"));
    }

    #[tokio::test]
    async fn test_sparse_add_tool_clarifies_without_side_effect() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate)
            .handle_message("add a new tool called fooscan")
            .await;
        assert!(reply.text.contains("command"));
        assert!(reply.text.contains("description"));
        assert!(store.list_requests().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_add_tool_creates_request() {
        let store = Store::open_in_memory().unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate)
            .handle_message(
                "Add a new tool called fooscan. It's a web directory scanner. \
                 The command to run it is: fooscan -u {url}.",
            )
            .await;
        let requests = store.list_requests().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(reply.text.contains(&requests[0].id));
    }

    #[tokio::test]
    async fn test_duplicate_add_tool_is_refused() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tool_if_absent(&echoer()).unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate)
            .handle_message(
                "Add a new tool called Echoer. It's a web scanner. \
                 The command to run it is: echoer -u {url}.",
            )
            .await;
        assert!(reply.text.contains("already exists"));
        assert!(store.list_requests().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_message_lists_known_tools() {
        let store = Store::open_in_memory().unwrap();
        store.insert_tool_if_absent(&echoer()).unwrap();
        let gate = ToolGate::new(2);
        let reply = dispatcher(&store, &gate)
            .handle_message("how are you today")
            .await;
        assert!(reply.text.contains("echoer"));
        assert!(reply.execution.is_none());
    }
}
