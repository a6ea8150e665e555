//! Environment variable key constants.
//!
//! Primary variables use `VULNPILOT_*`; LLM keys fall back to the common
//! `OPENAI_*` names so an existing shell environment just works.

/// LLM API configuration
pub mod llm {
    pub const API_BASE: &str = "VULNPILOT_API_BASE";
    pub const API_BASE_ALIASES: &[&str] = &["OPENAI_API_BASE", "OPENAI_BASE_URL", "BASE_URL"];

    pub const API_KEY: &str = "VULNPILOT_API_KEY";
    pub const API_KEY_ALIASES: &[&str] = &["OPENAI_API_KEY", "API_KEY"];

    pub const MODEL: &str = "VULNPILOT_MODEL";
    pub const MODEL_ALIASES: &[&str] = &["OPENAI_MODEL", "MODEL"];
}

/// Data root and storage paths
pub mod paths {
    pub const VULNPILOT_DATA_DIR: &str = "VULNPILOT_DATA_DIR";
}

/// Observability and logging
pub mod observability {
    pub const VULNPILOT_QUIET: &str = "VULNPILOT_QUIET";
    pub const VULNPILOT_LOG_LEVEL: &str = "VULNPILOT_LOG_LEVEL";
    pub const VULNPILOT_LOG_JSON: &str = "VULNPILOT_LOG_JSON";
    pub const VULNPILOT_AUDIT_LOG: &str = "VULNPILOT_AUDIT_LOG";
}

/// Tool execution limits
pub mod execution {
    pub const VULNPILOT_TIMEOUT_SECS: &str = "VULNPILOT_TIMEOUT_SECS";
    pub const VULNPILOT_MAX_CONCURRENT_PER_TOOL: &str = "VULNPILOT_MAX_CONCURRENT_PER_TOOL";
}
