//! Infrastructure layer for Convo.
//!
//! Contains implementations of the ports defined in `convo-core`: the SQLite
//! partitioned document store, the OpenAI/Azure OpenAI completion client,
//! and the configuration loader.

pub mod completion;
pub mod config;
pub mod sqlite;
