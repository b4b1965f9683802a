//! Conversation persistence and turn orchestration for Convo.
//!
//! This crate defines the "ports" (`DocumentStore`, `CompletionClient`) that
//! the infrastructure layer implements, the `ConversationStore` that owns the
//! session/message data model on top of a document store, and the
//! `ConversationService` that runs chat turns. It depends only on
//! `convo-types` -- never on `convo-infra` or any database/IO crate.

pub mod completion;
pub mod conversation;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
