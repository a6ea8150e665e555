//! Minimal LLM HTTP client for the classifier fallback and execution
//! analysis. OpenAI-compatible `/chat/completions` only; every call carries
//! an explicit timeout and maps failures to `Error::Upstream` for the
//! caller to degrade on.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use vulnpilot_core::config::LlmConfig;
use vulnpilot_core::error::{Error, Result};

pub mod analysis;
pub mod classifier;

pub struct LlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key,
            model: cfg.model,
        }
    }

    /// None when no API key is configured; callers skip the upstream
    /// entirely instead of sending doomed requests.
    pub fn from_env() -> Option<Self> {
        LlmConfig::try_from_env().map(Self::new)
    }

    /// One non-streaming chat completion; returns the assistant content.
    pub(crate) async fn chat_completion(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": 0,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::upstream(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(format!("API error {status}: {text}")));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Option<Vec<Choice>>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Option<Message>,
        }
        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| Error::upstream(format!("unparsable response: {e}")))?;

        chat.choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| Error::upstream("response carried no content"))
    }
}

/// Slice out the first JSON object in a response that may be wrapped in
/// markdown fences or prose.
pub(crate) fn extract_json_object(content: &str) -> &str {
    let content = content.trim();
    let start = content.find('{').unwrap_or(0);
    let end = content.rfind('}').map(|i| i + 1).unwrap_or(content.len());
    content.get(start..end).unwrap_or(content)
}

/// Truncate at a safe UTF-8 char boundary.
pub(crate) fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
