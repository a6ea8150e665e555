//! Parameter extraction: raw target → parameter map per a descriptor's
//! schema. Pure, deterministic, and idempotent: applying a rule to its own
//! output is a no-op.

use std::collections::BTreeMap;

use vulnpilot_core::tool::ParamKind;

/// Normalize to a URL: bare hosts get an https:// scheme.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

/// Reduce to a bare host: strip scheme and any path/query; a port stays.
pub fn normalize_domain(raw: &str) -> String {
    let raw = raw.trim();
    let without_scheme = match raw.find("://") {
        Some(pos) => &raw[pos + 3..],
        None => raw,
    };
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .to_string()
}

fn apply(kind: ParamKind, raw: &str) -> String {
    match kind {
        ParamKind::Url => normalize_url(raw),
        ParamKind::Domain => normalize_domain(raw),
        ParamKind::Target | ParamKind::Custom => raw.trim().to_string(),
    }
}

/// Fill every slot in the schema from the single raw target, each through
/// its own rule. An empty schema falls back to the default slot name with
/// passthrough.
pub fn extract(
    params: &BTreeMap<String, ParamKind>,
    default_param: &str,
    raw_target: &str,
) -> BTreeMap<String, String> {
    if params.is_empty() {
        return [(default_param.to_string(), raw_target.trim().to_string())].into();
    }
    params
        .iter()
        .map(|(slot, kind)| (slot.clone(), apply(*kind, raw_target)))
        .collect()
}
