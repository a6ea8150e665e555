//! Tool descriptor model: invocation template, parameter schema, metadata.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Extraction rule for one parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Normalize to a URL: bare hosts get an https:// scheme.
    Url,
    /// Reduce to a bare host: scheme and path are stripped.
    Domain,
    /// Pass the raw target through unchanged.
    Target,
    /// No transformation; fills the descriptor's default slot.
    Custom,
}

/// Registry entry describing one security tool's invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique id; canonical form is lowercase (see [`canonical_id`]).
    pub id: String,
    pub name: String,
    pub description: String,
    /// Command template with named `{placeholder}` slots. The first
    /// whitespace-separated token is the executable.
    pub command: String,
    /// Slot name → extraction rule.
    #[serde(default)]
    pub params: BTreeMap<String, ParamKind>,
    /// Slot filled when the schema is empty.
    #[serde(default = "default_param_name")]
    pub default_param: String,
    #[serde(default)]
    pub category: String,
    /// Natural-language phrases that trigger this tool.
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_example: Option<String>,
}

fn default_param_name() -> String {
    "target".to_string()
}

/// Lowercase-trimmed canonical form of a tool id. All matching across
/// entry points goes through this, so "Nmap" and "nmap" are the same tool.
pub fn canonical_id(id: &str) -> String {
    id.trim().to_lowercase()
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder regex"))
}

/// Placeholder names appearing in a command template, in order of first use.
pub fn placeholders(command: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in placeholder_re().captures_iter(command) {
        let name = caps[1].to_string();
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

impl ToolDescriptor {
    /// Registration-time validation. Every placeholder in the command
    /// template must have a schema entry; missing required fields and a
    /// non-canonical id are rejected here, never at dispatch time.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.id != canonical_id(&self.id) {
            return Err(Error::validation(format!(
                "tool id '{}' must be non-empty lowercase",
                self.id
            )));
        }
        if self.command.trim().is_empty() {
            return Err(Error::validation("command template is empty"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("description is empty"));
        }
        let unknown: Vec<String> = placeholders(&self.command)
            .into_iter()
            .filter(|p| !self.params.contains_key(p))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::validation(format!(
                "command template references undeclared parameter(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }
}

/// Admin field overrides applied when a request is approved. Only set
/// fields replace the proposed values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_phrases: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_example: Option<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.command.is_none()
            && self.category.is_none()
            && self.trigger_phrases.is_none()
            && self.usage_example.is_none()
    }

    /// Merge into a proposed descriptor, returning the descriptor that will
    /// actually enter the registry.
    pub fn apply(&self, mut descriptor: ToolDescriptor) -> ToolDescriptor {
        if let Some(ref name) = self.name {
            descriptor.name = name.clone();
            descriptor.id = canonical_id(name);
        }
        if let Some(ref description) = self.description {
            descriptor.description = description.clone();
        }
        if let Some(ref command) = self.command {
            descriptor.command = command.clone();
        }
        if let Some(ref category) = self.category {
            descriptor.category = category.clone();
        }
        if let Some(ref phrases) = self.trigger_phrases {
            descriptor.trigger_phrases = phrases.clone();
        }
        if let Some(ref example) = self.usage_example {
            descriptor.usage_example = Some(example.clone());
        }
        descriptor
    }
}
