//! vulnpilot core: config, observability, error taxonomy, tool descriptor model.

pub mod config;
pub mod error;
pub mod observability;
pub mod tool;

pub use error::{Error, Result};
