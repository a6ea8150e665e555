//! Preconfigured tool catalog seeded into an empty registry.

use std::collections::BTreeMap;

use vulnpilot_core::error::Result;
use vulnpilot_core::tool::{ParamKind, ToolDescriptor};
use vulnpilot_store::Store;

fn tool(
    id: &str,
    name: &str,
    description: &str,
    command: &str,
    params: &[(&str, ParamKind)],
    default_param: &str,
    category: &str,
    trigger_phrases: &[&str],
    usage_example: &str,
) -> ToolDescriptor {
    ToolDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        command: command.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        default_param: default_param.to_string(),
        category: category.to_string(),
        trigger_phrases: trigger_phrases.iter().map(|s| s.to_string()).collect(),
        usage_example: Some(usage_example.to_string()),
    }
}

/// The built-in descriptors. Seeding never overwrites an existing entry,
/// so operator edits survive re-seeding.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        tool(
            "nmap",
            "Nmap",
            "Network scanner for discovering hosts and services",
            "nmap -sV {target}",
            &[("target", ParamKind::Target)],
            "target",
            "network",
            &["port scan", "scan ports", "network scan", "open ports"],
            "Run Nmap on 192.168.1.1",
        ),
        tool(
            "nuclei",
            "Nuclei",
            "Template-based vulnerability scanner",
            "nuclei -u {url}",
            &[("url", ParamKind::Url)],
            "url",
            "web_security",
            &["vulnerability scan", "nuclei templates", "find vulnerabilities"],
            "Scan example.com with Nuclei",
        ),
        tool(
            "whatweb",
            "WhatWeb",
            "Web technology fingerprinting scanner",
            "whatweb {url}",
            &[("url", ParamKind::Url)],
            "url",
            "web_security",
            &["fingerprint", "what technologies", "identify technologies"],
            "Check what technologies run on example.com",
        ),
        tool(
            "sqlmap",
            "sqlmap",
            "Automatic SQL injection detection and exploitation",
            "sqlmap -u {url} --batch",
            &[("url", ParamKind::Url)],
            "url",
            "web_security",
            &["sql injection", "test for sqli", "sqlmap"],
            "Run sqlmap on https://example.com/login",
        ),
        tool(
            "subfinder",
            "Subfinder",
            "Passive subdomain discovery",
            "subfinder -d {domain}",
            &[("domain", ParamKind::Domain)],
            "domain",
            "recon",
            &["find subdomains", "enumerate subdomains", "subdomain enumeration"],
            "Find subdomains of example.com",
        ),
        tool(
            "nikto",
            "Nikto",
            "Web server scanner for dangerous files and outdated software",
            "nikto -h {url}",
            &[("url", ParamKind::Url)],
            "url",
            "web_security",
            &["web server scan", "nikto scan"],
            "Run Nikto on https://example.com",
        ),
    ]
}

/// Seed the registry. Returns how many descriptors were actually inserted.
pub fn seed(store: &Store) -> Result<usize> {
    let mut inserted = 0;
    for descriptor in builtin_tools() {
        if store.insert_tool_if_absent(&descriptor)? {
            tracing::info!(tool_id = %descriptor.id, "seeded preconfigured tool");
            inserted += 1;
        }
    }
    Ok(inserted)
}
