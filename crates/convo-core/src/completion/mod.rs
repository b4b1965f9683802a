//! Completion endpoint port and its type-erased wrapper.

pub mod box_client;
pub mod client;
