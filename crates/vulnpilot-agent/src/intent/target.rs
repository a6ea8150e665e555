//! Target detection heuristics: URL, then bare domain, then IPv4.

use std::sync::OnceLock;

use regex::Regex;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bhttps?://[^\s"'<>]+"#).expect("static pattern"))
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b")
            .expect("static pattern")
    })
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b")
            .expect("static pattern")
    })
}

/// Find the scan target in a message. First match wins: explicit URL, then
/// bare domain, then IPv4 literal.
pub fn detect_target(message: &str) -> Option<String> {
    if let Some(m) = url_re().find(message) {
        return Some(m.as_str().trim_end_matches(['.', ',']).to_string());
    }
    if let Some(m) = domain_re().find(message) {
        return Some(m.as_str().to_string());
    }
    ipv4_re().find(message).map(|m| m.as_str().to_string())
}

/// Whether a single token is plausibly a target on its own.
pub(super) fn looks_like_target(token: &str) -> bool {
    url_re().is_match(token) || domain_re().is_match(token) || ipv4_re().is_match(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_wins_over_domain() {
        assert_eq!(
            detect_target("scan https://example.com/login and also evil.org"),
            Some("https://example.com/login".to_string())
        );
    }

    #[test]
    fn test_bare_domain() {
        assert_eq!(
            detect_target("take a look at sub.example.co.uk please"),
            Some("sub.example.co.uk".to_string())
        );
    }

    #[test]
    fn test_ipv4_literal() {
        assert_eq!(
            detect_target("probe 192.168.1.17 tonight"),
            Some("192.168.1.17".to_string())
        );
        assert_eq!(detect_target("not an ip: 999.1.2.3"), None);
    }

    #[test]
    fn test_no_target() {
        assert_eq!(detect_target("hello, what can you do?"), None);
    }

    #[test]
    fn test_looks_like_target() {
        assert!(looks_like_target("example.com"));
        assert!(looks_like_target("https://example.com"));
        assert!(looks_like_target("10.0.0.5"));
        assert!(!looks_like_target("what"));
    }
}
