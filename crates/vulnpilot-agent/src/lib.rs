//! Intent resolution and the LLM boundary.
//!
//! The pattern cascade (`intent`) and parameter extraction (`extract`) are
//! pure and read-only over registry snapshots; the `llm` module holds the
//! external classifier fallback and execution analysis, both of which
//! degrade gracefully when the upstream is absent or misbehaving.

pub mod extract;
pub mod intent;
pub mod llm;
