//! Cascading intent resolution over a free-text message.
//!
//! Stages, first success wins, no re-ranking:
//!   1. add-tool phrase detection (with structured info extraction)
//!   2. explicit command patterns (run/execute/use, scan/check/analyze)
//!   3. trigger-phrase containment against the registry
//!   4. external classifier fallback (async, validated, fail-closed)
//!
//! Stages 1–3 are pure over a registry snapshot. An empty message resolves
//! to `Intent::None` without touching any stage.

use vulnpilot_core::tool::{canonical_id, ToolDescriptor};
use vulnpilot_store::RegistrySnapshot;

use crate::llm::classifier;
use crate::llm::LlmClient;

mod patterns;
mod target;

pub use patterns::proposed_tool_from_parts;
pub use target::detect_target;

/// Outcome of resolving one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Run a registered tool against a raw target string.
    Execute { tool_id: String, raw_target: String },
    /// Register a new tool; carries the extracted proposal.
    AddTool { proposed: ToolDescriptor },
    /// An add-tool message missing required fields; names exactly what is
    /// missing instead of creating a half-empty request.
    Clarify { missing_fields: Vec<String> },
    /// No stage matched.
    None,
}

/// Resolve using the deterministic stages only (1–3).
pub fn resolve(message: &str, registry: &RegistrySnapshot) -> Intent {
    let message = message.trim();
    if message.is_empty() {
        return Intent::None;
    }

    // Stage 1: add-tool detection. A match here is final; later stages
    // never re-evaluate the message.
    if let Some(intent) = patterns::detect_add_tool(message) {
        return intent;
    }

    // Stage 2: explicit command patterns.
    if let Some(intent) = patterns::detect_explicit_command(message, registry) {
        return intent;
    }

    // Stage 3: trigger-phrase containment, snapshot (lexicographic) order.
    let lowered = message.to_lowercase();
    for (tool_id, descriptor) in registry.iter() {
        let hit = descriptor
            .trigger_phrases
            .iter()
            .any(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()));
        if hit {
            if let Some(raw_target) = target::detect_target(message) {
                tracing::debug!(tool_id = %tool_id, "trigger phrase matched");
                return Intent::Execute {
                    tool_id: tool_id.clone(),
                    raw_target,
                };
            }
            // Phrase without a detectable target: keep scanning, then let
            // the classifier have a look.
        }
    }

    Intent::None
}

/// Full cascade: deterministic stages, then the external classifier as the
/// last resort. Upstream failures degrade to `Intent::None`.
pub async fn resolve_with_fallback(
    message: &str,
    registry: &RegistrySnapshot,
    client: Option<&LlmClient>,
) -> Intent {
    let intent = resolve(message, registry);
    if intent != Intent::None {
        return intent;
    }
    if message.trim().is_empty() {
        return Intent::None;
    }
    match client {
        Some(client) => classifier::classify(client, message, registry).await,
        None => Intent::None,
    }
}

/// Resolve a tool token against the registry: exact canonical match first,
/// then case-insensitive substring containment either direction, in
/// snapshot iteration order.
pub fn resolve_tool_token(token: &str, registry: &RegistrySnapshot) -> Option<String> {
    let token = canonical_id(token);
    if token.is_empty() {
        return None;
    }
    if registry.contains_key(&token) {
        return Some(token);
    }
    registry
        .keys()
        .find(|key| key.contains(&token) || token.contains(key.as_str()))
        .cloned()
}
