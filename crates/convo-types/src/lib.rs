//! Shared domain types for Convo.
//!
//! Sessions, messages and the stored `Document` union, completion request
//! and response types, configuration, and the error enums shared by every
//! layer.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, secrecy.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
