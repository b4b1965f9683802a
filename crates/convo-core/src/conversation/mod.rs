//! Per-turn conversation workflow: persistence, completion, summary.

pub mod prompts;
pub mod service;
pub mod summary;
