//! Document store port and the conversation store built on it.

pub mod context;
pub mod conversation;
pub mod document;
