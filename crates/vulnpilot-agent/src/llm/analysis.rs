//! Execution analysis: optional narrative over an execution record.
//!
//! Failure here never fails the pipeline: an unavailable or misbehaving
//! upstream falls back to a local extractive summary of the captured
//! output, and an empty record yields no narrative at all.

use std::time::Duration;

use serde::Deserialize;

use vulnpilot_store::ExecutionRecord;

use super::{extract_json_object, safe_truncate, LlmClient};

const TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TOKENS: u32 = 512;
/// How much captured output is shown to the summarizer.
const MAX_OUTPUT_BYTES: usize = 6_000;

/// Structured narrative returned by the summarizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

impl AnalysisReport {
    fn is_empty(&self) -> bool {
        self.findings.is_empty()
            && self.severity.is_empty()
            && self.impact.is_empty()
            && self.recommendations.is_empty()
            && self.follow_ups.is_empty()
    }

    /// Render for the chat reply.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.findings.is_empty() {
            out.push_str(&format!("Findings: {}\n", self.findings));
        }
        if !self.severity.is_empty() {
            out.push_str(&format!("Severity: {}\n", self.severity));
        }
        if !self.impact.is_empty() {
            out.push_str(&format!("Impact: {}\n", self.impact));
        }
        if !self.recommendations.is_empty() {
            out.push_str(&format!("Recommendations: {}\n", self.recommendations));
        }
        if !self.follow_ups.is_empty() {
            out.push_str("Suggested follow-ups:\n");
            for item in &self.follow_ups {
                out.push_str(&format!("  - {item}\n"));
            }
        }
        out.trim_end().to_string()
    }
}

const SYSTEM_PROMPT: &str = "You are a security analyst summarizing raw tool output. \
Reply with ONE JSON object: {\"findings\": string, \"severity\": string, \"impact\": string, \
\"recommendations\": string, \"follow_ups\": [string]}. Be concise and factual.";

fn user_prompt(record: &ExecutionRecord) -> String {
    let exit = record
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Tool: {}\nCommand: {}\nStatus: {} (exit code {exit})\n\nStdout:\n{}\n\nStderr:\n{}",
        record.tool_id,
        record.argv.join(" "),
        record.status.as_str(),
        safe_truncate(&record.stdout, MAX_OUTPUT_BYTES),
        safe_truncate(&record.stderr, MAX_OUTPUT_BYTES),
    )
}

/// First few sentences of the output, used when the upstream summarizer is
/// unavailable.
pub fn extractive_summary(text: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> = text
        .split(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(max_sentences)
        .collect();
    if sentences.is_empty() {
        return String::new();
    }
    format!("{}.", sentences.join(". "))
}

fn fallback_narrative(record: &ExecutionRecord) -> Option<String> {
    let source = if !record.stdout.trim().is_empty() {
        &record.stdout
    } else {
        &record.stderr
    };
    let summary = extractive_summary(source, 3);
    if summary.is_empty() {
        None
    } else {
        Some(format!("Output summary: {summary}"))
    }
}

/// Request a narrative for an execution record. Returns None when there is
/// nothing useful to say; never returns an error.
pub async fn narrative(client: Option<&LlmClient>, record: &ExecutionRecord) -> Option<String> {
    let Some(client) = client else {
        return fallback_narrative(record);
    };

    match client
        .chat_completion(SYSTEM_PROMPT, &user_prompt(record), MAX_TOKENS, TIMEOUT)
        .await
    {
        Ok(content) => {
            match serde_json::from_str::<AnalysisReport>(extract_json_object(&content)) {
                Ok(report) if !report.is_empty() => Some(report.render()),
                _ => {
                    tracing::warn!(tool_id = %record.tool_id, "analysis reply unusable, falling back to extractive summary");
                    fallback_narrative(record)
                }
            }
        }
        Err(e) => {
            tracing::warn!(tool_id = %record.tool_id, err = %e, "analysis upstream failed, falling back to extractive summary");
            fallback_narrative(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use vulnpilot_store::ExecStatus;

    use super::*;

    fn record(stdout: &str, stderr: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: 1,
            tool_id: "nmap".to_string(),
            params: BTreeMap::new(),
            argv: vec!["nmap".to_string(), "example.com".to_string()],
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: ExecStatus::Completed,
            exit_code: Some(0),
            duration_ms: 10,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_extractive_summary_takes_leading_sentences() {
        let text = "Port 80 open. Port 443 open. Port 22 filtered. Host up.";
        assert_eq!(
            extractive_summary(text, 2),
            "Port 80 open. Port 443 open."
        );
    }

    #[test]
    fn test_extractive_summary_of_empty_text() {
        assert_eq!(extractive_summary("", 3), "");
        assert_eq!(extractive_summary("  \n ", 3), "");
    }

    #[tokio::test]
    async fn test_no_client_uses_fallback() {
        let narrative = narrative(None, &record("80/tcp open http", "")).await;
        assert!(narrative.unwrap().contains("80/tcp open http"));
    }

    #[tokio::test]
    async fn test_no_client_and_no_output_yields_nothing() {
        assert!(narrative(None, &record("", "")).await.is_none());
    }

    #[tokio::test]
    async fn test_stderr_feeds_fallback_when_stdout_empty() {
        let narrative = narrative(None, &record("", "connection refused")).await;
        assert!(narrative.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_report_render_skips_empty_sections() {
        let report = AnalysisReport {
            findings: "two open ports".to_string(),
            follow_ups: vec!["run nuclei".to_string()],
            ..Default::default()
        };
        let rendered = report.render();
        assert!(rendered.contains("Findings: two open ports"));
        assert!(rendered.contains("- run nuclei"));
        assert!(!rendered.contains("Severity"));
    }
}
