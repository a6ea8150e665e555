//! Fixed phrase patterns for the deterministic cascade stages.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use vulnpilot_core::tool::{canonical_id, ParamKind, ToolDescriptor};
use vulnpilot_store::RegistrySnapshot;

use super::{resolve_tool_token, Intent};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern")
}

fn add_tool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        re(r"(?i)\b(?:add|install|create)\s+(?:a\s+|the\s+|new\s+)*(?:tool|scanner|security\s+tool)\s+(?:called\s+|named\s+)?([A-Za-z0-9][A-Za-z0-9_-]*)")
    })
}

fn command_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            re(r"(?i)\bcommand\s+to\s+run\s+it\s+is\s*:?\s*`?([^`\n]+?)`?(?:\.\s|\.$|$)"),
            re(r"(?i)\bcommand\s*(?:is|:)\s*`?([^`\n]+?)`?(?:\.\s|\.$|$)"),
        ]
    })
}

fn description_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            re(r"(?i)\bit(?:'s|’s|\s+is)\s+(?:a|an)\s+([^.\n]+)"),
            re(r"(?i)\bdescription\s*(?:is|:)\s*([^.\n]+)"),
        ]
    })
}

fn category_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            re(r"(?i)\bbelongs\s+to\s+the\s+([a-z_][a-z_-]*)\s+category"),
            re(r"(?i)\bcategory\s*(?:is|:)\s*([a-z_][a-z_-]*)"),
        ]
    })
}

fn run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)\b(?:run|execute|use)\s+([A-Za-z0-9][\w-]*)\s+(?:on|against)\s+(\S+)"))
}

fn scan_with_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        re(r"(?i)\b(?:scan|check|analyze)\s+(\S+)\s+(?:with|using)\s+([A-Za-z0-9][\w-]*)")
    })
}

fn scan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?i)\b(scan|check|analyze)\s+(\S+)"))
}

/// Fixed action → default tool for tool-less scan/check/analyze forms.
const DEFAULT_ACTION_TOOLS: &[(&str, &str)] = &[
    ("scan", "nmap"),
    ("check", "whatweb"),
    ("analyze", "nuclei"),
];

fn trim_target(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\''))
        .to_string()
}

fn first_capture(res: &[Regex], message: &str) -> Option<String> {
    res.iter().find_map(|re| {
        re.captures(message)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

// ─── Stage 1: add-tool detection ────────────────────────────────────────────

pub(super) fn detect_add_tool(message: &str) -> Option<Intent> {
    let caps = add_tool_re().captures(message)?;
    let name = caps[1].to_string();
    let command = first_capture(command_res(), message);
    let description = first_capture(description_res(), message);
    let category = first_capture(category_res(), message);

    let intent = match proposed_tool_from_parts(
        &name,
        description.as_deref(),
        command.as_deref(),
        category.as_deref(),
        &[],
    ) {
        Ok(proposed) => Intent::AddTool { proposed },
        Err(missing_fields) => Intent::Clarify { missing_fields },
    };
    Some(intent)
}

/// Build a reviewable descriptor from extracted parts. Missing required
/// fields come back as an error listing exactly what is absent, in a stable
/// order.
pub fn proposed_tool_from_parts(
    name: &str,
    description: Option<&str>,
    command: Option<&str>,
    category: Option<&str>,
    trigger_phrases: &[String],
) -> Result<ToolDescriptor, Vec<String>> {
    let mut missing = Vec::new();
    if command.map_or(true, |c| c.trim().is_empty()) {
        missing.push("command".to_string());
    }
    if description.map_or(true, |d| d.trim().is_empty()) {
        missing.push("description".to_string());
    }
    if !missing.is_empty() {
        return Err(missing);
    }

    let command = command.unwrap_or_default().trim().to_string();
    let description = description.unwrap_or_default().trim().to_string();
    let id = canonical_id(name);
    let params = infer_params(&command);
    let default_param = params
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "target".to_string());
    let category = category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| infer_category(&description));
    let trigger_phrases = if trigger_phrases.is_empty() {
        generate_trigger_phrases(&id)
    } else {
        trigger_phrases.to_vec()
    };

    Ok(ToolDescriptor {
        id: id.clone(),
        name: name.to_string(),
        usage_example: Some(format!("Run {name} on https://example.com")),
        description,
        command,
        params,
        default_param,
        category,
        trigger_phrases,
    })
}

/// Map each placeholder in the command template to an extraction rule,
/// keyed off the slot name.
fn infer_params(command: &str) -> BTreeMap<String, ParamKind> {
    vulnpilot_core::tool::placeholders(command)
        .into_iter()
        .map(|slot| {
            let kind = if slot.contains("url") {
                ParamKind::Url
            } else if slot.contains("domain") || slot.contains("host") {
                ParamKind::Domain
            } else if slot.contains("target") {
                ParamKind::Target
            } else {
                ParamKind::Custom
            };
            (slot, kind)
        })
        .collect()
}

/// Keyword-based category guess when the message does not state one.
fn infer_category(description: &str) -> String {
    const WEB: &[&str] = &["web", "http", "url", "site", "application", "crawler", "fuzzer", "directory"];
    const NETWORK: &[&str] = &["network", "port", "scan", "discovery", "enumeration"];
    const RECON: &[&str] = &["reconnaissance", "recon", "subdomain", "osint", "information"];

    let lowered = description.to_lowercase();
    if WEB.iter().any(|k| lowered.contains(k)) {
        "web_security".to_string()
    } else if NETWORK.iter().any(|k| lowered.contains(k)) {
        "network".to_string()
    } else if RECON.iter().any(|k| lowered.contains(k)) {
        "recon".to_string()
    } else {
        "other".to_string()
    }
}

fn generate_trigger_phrases(id: &str) -> Vec<String> {
    vec![
        format!("run {id}"),
        format!("use {id}"),
        format!("execute {id}"),
        format!("start {id} scan"),
        format!("scan with {id}"),
    ]
}

// ─── Stage 2: explicit command patterns ─────────────────────────────────────

pub(super) fn detect_explicit_command(
    message: &str,
    registry: &RegistrySnapshot,
) -> Option<Intent> {
    // run|execute|use <tool> on|against <target>
    if let Some(caps) = run_re().captures(message) {
        if let Some(tool_id) = resolve_tool_token(&caps[1], registry) {
            return Some(Intent::Execute {
                tool_id,
                raw_target: trim_target(&caps[2]),
            });
        }
    }

    // scan|check|analyze <target> with|using <tool>. An unknown tool token
    // here falls through the whole stage rather than hitting the default
    // map with a tool the operator did not ask for.
    if let Some(caps) = scan_with_re().captures(message) {
        let raw_target = trim_target(&caps[1]);
        return resolve_tool_token(&caps[2], registry)
            .map(|tool_id| Intent::Execute { tool_id, raw_target });
    }

    // Tool-less scan|check|analyze <target>: fixed action → default tool.
    // Only fires when the captured token actually looks like a target, so
    // "check what ..." prose does not get dispatched against "what".
    if let Some(caps) = scan_re().captures(message) {
        let action = caps[1].to_lowercase();
        let raw_target = trim_target(&caps[2]);
        if super::target::looks_like_target(&raw_target) {
            let default = DEFAULT_ACTION_TOOLS
                .iter()
                .find(|(a, _)| *a == action)
                .map(|(_, tool)| *tool)?;
            if registry.contains_key(default) {
                return Some(Intent::Execute {
                    tool_id: default.to_string(),
                    raw_target,
                });
            }
        }
    }

    None
}
