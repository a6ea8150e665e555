//! Configuration structs grouped by concern, loaded from the environment.

use std::path::PathBuf;

use super::env_keys::{execution as exec_keys, llm, observability as obv_keys, paths};
use super::loader::{env_bool, env_optional, env_or};

/// LLM API configuration for the classifier fallback and execution analysis.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        Self {
            api_base: env_or(llm::API_BASE, llm::API_BASE_ALIASES, || {
                "https://api.openai.com/v1".to_string()
            }),
            api_key: env_or(llm::API_KEY, llm::API_KEY_ALIASES, String::new),
            model: env_or(llm::MODEL, llm::MODEL_ALIASES, || "gpt-4o-mini".to_string()),
        }
    }

    /// None when api_key or api_base is empty; upstream calls are skipped
    /// entirely rather than attempted with a broken config.
    pub fn try_from_env() -> Option<Self> {
        let cfg = Self::from_env();
        if cfg.api_key.trim().is_empty() || cfg.api_base.trim().is_empty() {
            None
        } else {
            Some(cfg)
        }
    }
}

/// Data root for the registry/request/execution stores.
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl PathsConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let data_dir = env_optional(paths::VULNPILOT_DATA_DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".vulnpilot")
            });
        Self { data_dir }
    }

    /// Path of the SQLite database backing all three stores.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("vulnpilot.sqlite")
    }
}

/// Tool execution limits.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionConfig {
    /// Hard deadline for a spawned tool process, in seconds.
    pub timeout_secs: u64,
    /// Concurrent executions allowed per tool id.
    pub max_concurrent_per_tool: usize,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONCURRENT_PER_TOOL: usize = 2;

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrent_per_tool: DEFAULT_MAX_CONCURRENT_PER_TOOL,
        }
    }
}

impl ExecutionConfig {
    pub fn from_env() -> Self {
        super::loader::load_dotenv();
        let timeout_secs = env_optional(exec_keys::VULNPILOT_TIMEOUT_SECS, &[])
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_concurrent_per_tool =
            env_optional(exec_keys::VULNPILOT_MAX_CONCURRENT_PER_TOOL, &[])
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_PER_TOOL);
        Self {
            timeout_secs,
            max_concurrent_per_tool,
        }
    }

    pub fn with_cli_overrides(mut self, cli_timeout: Option<u64>) -> Self {
        if let Some(timeout) = cli_timeout {
            self.timeout_secs = timeout;
        }
        self
    }
}

/// Observability: quiet, log_level, log_json, audit_log.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            super::loader::load_dotenv();
            let quiet = env_bool(obv_keys::VULNPILOT_QUIET, &[], false);
            let log_level = env_or(obv_keys::VULNPILOT_LOG_LEVEL, &[], || {
                "vulnpilot=info".to_string()
            });
            let log_json = env_bool(obv_keys::VULNPILOT_LOG_JSON, &[], false);
            let audit_log = env_optional(obv_keys::VULNPILOT_AUDIT_LOG, &[]);
            Self {
                quiet,
                log_level,
                log_json,
                audit_log,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_defaults() {
        let cfg = ExecutionConfig::default();
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.max_concurrent_per_tool, DEFAULT_MAX_CONCURRENT_PER_TOOL);
    }

    #[test]
    fn test_cli_override_wins() {
        let cfg = ExecutionConfig::default().with_cli_overrides(Some(5));
        assert_eq!(cfg.timeout_secs, 5);
    }
}
