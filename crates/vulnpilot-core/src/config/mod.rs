//! Unified configuration layer.
//!
//! All environment variable reads are centralized here; business code goes
//! through the structured configs instead of calling `std::env::var`.
//!
//! - `loader`: env_or / env_optional / env_bool helpers, once-only `.env` load
//! - `schema`: LlmConfig, PathsConfig, ObservabilityConfig, ExecutionConfig
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, load_dotenv};
pub use schema::{ExecutionConfig, LlmConfig, ObservabilityConfig, PathsConfig};
