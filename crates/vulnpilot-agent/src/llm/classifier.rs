//! External classifier fallback: last stage of the intent cascade.
//!
//! The reply must parse into the strict verdict schema below; unknown
//! fields, missing structure, or a tool name absent from the registry all
//! degrade to `Intent::None`. One retry with backoff on transport failure.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use vulnpilot_core::tool::canonical_id;
use vulnpilot_store::RegistrySnapshot;

use crate::intent::{detect_target, proposed_tool_from_parts, Intent};

use super::{extract_json_object, LlmClient};

const TIMEOUT: Duration = Duration::from_secs(15);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const MAX_TOKENS: u32 = 256;

/// Strict reply schema. Any other shape is a non-match.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierVerdict {
    pub is_tool_command: bool,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameters: Option<BTreeMap<String, String>>,
    pub is_add_tool_request: bool,
    #[serde(default)]
    pub new_tool_info: Option<NewToolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewToolInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub nl_patterns: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You classify operator messages for a security tooling assistant. \
Reply with ONE JSON object and nothing else, exactly this shape: \
{\"is_tool_command\": bool, \"tool_name\": string|null, \"parameters\": object|null, \
\"is_add_tool_request\": bool, \"new_tool_info\": {\"name\": string, \"description\": string, \
\"command\": string, \"category\": string, \"nl_patterns\": [string]}|null}. \
Only name tools from the provided list. When nothing matches, set both booleans to false.";

fn user_prompt(message: &str, registry: &RegistrySnapshot) -> String {
    let mut known = String::new();
    for (id, descriptor) in registry.iter() {
        known.push_str(&format!("- {}: {}\n", id, descriptor.description));
    }
    format!("Known tools:\n{known}\nMessage: {message}")
}

/// Parse the raw reply into a verdict. Pure; None on any shape mismatch.
pub fn parse_verdict(content: &str) -> Option<ClassifierVerdict> {
    serde_json::from_str(extract_json_object(content)).ok()
}

/// Turn a parsed verdict into an intent, fail-closed. Pure.
pub fn verdict_to_intent(
    verdict: &ClassifierVerdict,
    message: &str,
    registry: &RegistrySnapshot,
) -> Intent {
    if verdict.is_add_tool_request {
        let Some(info) = verdict.new_tool_info.as_ref() else {
            return Intent::None;
        };
        let Some(name) = info.name.as_deref().filter(|n| !n.trim().is_empty()) else {
            return Intent::None;
        };
        return match proposed_tool_from_parts(
            name,
            info.description.as_deref(),
            info.command.as_deref(),
            info.category.as_deref(),
            &info.nl_patterns,
        ) {
            Ok(proposed) => Intent::AddTool { proposed },
            Err(missing_fields) => Intent::Clarify { missing_fields },
        };
    }

    if verdict.is_tool_command {
        let Some(tool_name) = verdict.tool_name.as_deref() else {
            return Intent::None;
        };
        let tool_id = canonical_id(tool_name);
        let Some(descriptor) = registry.get(&tool_id) else {
            // Never trust a tool name the registry does not know.
            return Intent::None;
        };
        let raw_target = verdict
            .parameters
            .as_ref()
            .and_then(|params| {
                params
                    .get(&descriptor.default_param)
                    .or_else(|| params.get("target"))
                    .or_else(|| params.values().next())
                    .cloned()
            })
            .filter(|t| !t.trim().is_empty())
            .or_else(|| detect_target(message));
        return match raw_target {
            Some(raw_target) => Intent::Execute { tool_id, raw_target },
            None => Intent::None,
        };
    }

    Intent::None
}

/// Call the classifier and validate its reply. Transport failures retry
/// once with backoff, then everything degrades to `Intent::None`; the
/// operator never sees a hard failure from a flaky upstream.
pub async fn classify(client: &LlmClient, message: &str, registry: &RegistrySnapshot) -> Intent {
    let user = user_prompt(message, registry);

    let mut reply = client
        .chat_completion(SYSTEM_PROMPT, &user, MAX_TOKENS, TIMEOUT)
        .await;
    if reply.is_err() {
        tokio::time::sleep(RETRY_BACKOFF).await;
        reply = client
            .chat_completion(SYSTEM_PROMPT, &user, MAX_TOKENS, TIMEOUT)
            .await;
    }

    let content = match reply {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(err = %e, "classifier unavailable, treating as no match");
            return Intent::None;
        }
    };

    let Some(verdict) = parse_verdict(&content) else {
        tracing::warn!("classifier reply did not match the verdict schema");
        return Intent::None;
    };
    let intent = verdict_to_intent(&verdict, message, registry);
    tracing::debug!(?intent, "classifier verdict");
    intent
}

#[cfg(test)]
mod tests {
    use vulnpilot_core::tool::{ParamKind, ToolDescriptor};

    use super::*;

    fn registry() -> RegistrySnapshot {
        let nmap = ToolDescriptor {
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
        [(nmap.id.clone(), nmap)].into()
    }

    #[test]
    fn test_valid_execute_verdict() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": true, "tool_name": "Nmap",
                "parameters": {"target": "example.com"},
                "is_add_tool_request": false, "new_tool_info": null}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "whatever", &registry()),
            Intent::Execute {
                tool_id: "nmap".to_string(),
                raw_target: "example.com".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_tool_name_is_none() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": true, "tool_name": "metasploit",
                "parameters": {"target": "example.com"},
                "is_add_tool_request": false}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "whatever", &registry()),
            Intent::None
        );
    }

    #[test]
    fn test_unknown_fields_fail_parsing() {
        assert!(parse_verdict(
            r#"{"is_tool_command": false, "is_add_tool_request": false, "confidence": 0.9}"#
        )
        .is_none());
    }

    #[test]
    fn test_missing_required_flags_fail_parsing() {
        assert!(parse_verdict(r#"{"tool_name": "nmap"}"#).is_none());
        assert!(parse_verdict("not json at all").is_none());
    }

    #[test]
    fn test_execute_without_parameters_falls_back_to_message_target() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": true, "tool_name": "nmap",
                "parameters": null, "is_add_tool_request": false}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "look at 10.1.2.3 for me", &registry()),
            Intent::Execute {
                tool_id: "nmap".to_string(),
                raw_target: "10.1.2.3".to_string(),
            }
        );
    }

    #[test]
    fn test_execute_without_any_target_is_none() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": true, "tool_name": "nmap",
                "parameters": null, "is_add_tool_request": false}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "do the thing", &registry()),
            Intent::None
        );
    }

    #[test]
    fn test_add_tool_verdict_with_complete_info() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": false, "is_add_tool_request": true,
                "new_tool_info": {"name": "Gobuster",
                                   "description": "directory brute forcer",
                                   "command": "gobuster dir -u {url}",
                                   "category": "web_security",
                                   "nl_patterns": ["brute force directories"]}}"#,
        )
        .unwrap();
        match verdict_to_intent(&verdict, "add gobuster please", &registry()) {
            Intent::AddTool { proposed } => {
                assert_eq!(proposed.id, "gobuster");
                assert_eq!(
                    proposed.trigger_phrases,
                    vec!["brute force directories".to_string()]
                );
            }
            other => panic!("expected AddTool, got {other:?}"),
        }
    }

    #[test]
    fn test_add_tool_verdict_without_info_is_none() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": false, "is_add_tool_request": true, "new_tool_info": null}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "add something", &registry()),
            Intent::None
        );
    }

    #[test]
    fn test_add_tool_verdict_missing_command_clarifies() {
        let verdict = parse_verdict(
            r#"{"is_tool_command": false, "is_add_tool_request": true,
                "new_tool_info": {"name": "gobuster",
                                   "description": "directory brute forcer"}}"#,
        )
        .unwrap();
        assert_eq!(
            verdict_to_intent(&verdict, "add gobuster", &registry()),
            Intent::Clarify {
                missing_fields: vec!["command".to_string()],
            }
        );
    }
}
