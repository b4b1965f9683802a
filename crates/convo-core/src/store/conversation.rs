//! Conversation store: sessions and messages on top of a [`DocumentStore`].
//!
//! Owns the data model rules: one partition per session, store-assigned
//! message identity, paged enumeration, and atomic single-partition batches.

use std::time::Duration;

use chrono::{SubsecRound, Utc};
use futures_util::{Stream, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use convo_types::chat::{Document, Message, PartitionKey, Session};
use convo_types::error::StoreError;

use super::context::CallContext;
use super::document::{DocumentQuery, DocumentStore, TransactionalBatch};

/// Paging and deadline settings for a [`ConversationStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub page_size: u32,
    pub timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of deleting a session partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Documents removed by the atomic delete batch.
    pub deleted: usize,
    /// Documents found in the partition after the batch committed
    /// (written concurrently, after enumeration).
    pub residual: usize,
}

/// Give a message its store-assigned identity.
///
/// The id is a fresh UUIDv7, so ids are unique and time-ordered. The
/// timestamp is truncated to microseconds, the precision it is stored with.
pub fn assign_identity(message: Message) -> Message {
    let timestamp = Utc::now().trunc_subsecs(6);
    message.with_identity(Uuid::now_v7().to_string(), timestamp)
}

/// Session and message persistence over a partitioned document store.
///
/// Generic over `DocumentStore` so convo-core never depends on convo-infra.
pub struct ConversationStore<D: DocumentStore> {
    store: D,
    options: StoreOptions,
}

impl<D: DocumentStore> ConversationStore<D> {
    pub fn new(store: D, options: StoreOptions) -> Self {
        Self { store, options }
    }

    /// Access the underlying document store.
    pub fn documents(&self) -> &D {
        &self.store
    }

    pub fn options(&self) -> StoreOptions {
        self.options
    }

    // --- Sessions ---

    /// Insert a new session. `Conflict` if its id already exists.
    pub async fn create_session(
        &self,
        session: &Session,
        ctx: &CallContext,
    ) -> Result<Session, StoreError> {
        if session.id.is_empty() || session.id != session.session_id {
            return Err(StoreError::validation(
                "create_session",
                format!(
                    "session id '{}' must be non-empty and equal its sessionId '{}'",
                    session.id, session.session_id
                ),
            ));
        }
        let pk = session.partition_key();
        let document = Document::from(session.clone());
        let stored = ctx
            .guard("create_session", Some(&pk), self.options.timeout, async {
                self.store.create_item(&document).await
            })
            .await?;
        info!(session_id = %pk, "Session created");
        expect_session("create_session", &pk, stored)
    }

    /// Point read of a session. `NotFound` if absent.
    pub async fn get_session(
        &self,
        session_id: &str,
        ctx: &CallContext,
    ) -> Result<Session, StoreError> {
        let pk = PartitionKey::from(session_id);
        let document = ctx
            .guard("get_session", Some(&pk), self.options.timeout, async {
                self.store.read_item(&pk, session_id).await
            })
            .await?;
        match document {
            Some(doc) => expect_session("get_session", &pk, doc),
            None => Err(StoreError::NotFound {
                operation: "get_session",
                partition_key: pk.to_string(),
                id: session_id.to_string(),
            }),
        }
    }

    /// Full replace of a session, guarded by its `_etag` when present.
    pub async fn replace_session(
        &self,
        session: &Session,
        ctx: &CallContext,
    ) -> Result<Session, StoreError> {
        let pk = session.partition_key();
        let document = Document::from(session.clone());
        let stored = ctx
            .guard("replace_session", Some(&pk), self.options.timeout, async {
                self.store
                    .replace_item(&document, session.etag.as_deref())
                    .await
            })
            .await?;
        debug!(session_id = %pk, "Session replaced");
        expect_session("replace_session", &pk, stored)
    }

    /// Lazily enumerate every session across all partitions.
    ///
    /// Pages are fetched one at a time, only after the previous page has
    /// been consumed.
    pub fn stream_sessions<'a>(
        &'a self,
        ctx: &'a CallContext,
    ) -> impl Stream<Item = Result<Session, StoreError>> + Send + 'a {
        async_stream::try_stream! {
            let query = DocumentQuery::sessions();
            let mut continuation: Option<String> = None;
            loop {
                let page = ctx
                    .guard("list_sessions", None, self.options.timeout, async {
                        self.store
                            .query_documents(&query, continuation.as_deref(), self.options.page_size)
                            .await
                    })
                    .await?;
                for document in page.items {
                    let pk = document.partition_key();
                    yield expect_session("list_sessions", &pk, document)?;
                }
                match page.continuation {
                    Some(token) => continuation = Some(token),
                    None => break,
                }
            }
        }
    }

    /// Collect every session, consuming all pages.
    pub async fn list_sessions(&self, ctx: &CallContext) -> Result<Vec<Session>, StoreError> {
        self.stream_sessions(ctx).try_collect().await
    }

    // --- Messages ---

    /// Persist a message under a fresh store-assigned id and timestamp.
    ///
    /// Any id or timestamp on `message` is discarded.
    pub async fn create_message(
        &self,
        message: Message,
        ctx: &CallContext,
    ) -> Result<Message, StoreError> {
        if message.session_id.is_empty() {
            return Err(StoreError::validation(
                "create_message",
                "message sessionId must not be empty",
            ));
        }
        let message = assign_identity(message);
        let pk = message.partition_key();
        let document = Document::from(message);
        let stored = ctx
            .guard("create_message", Some(&pk), self.options.timeout, async {
                self.store.create_item(&document).await
            })
            .await?;
        expect_message("create_message", &pk, stored)
    }

    /// Every message of a session, ordered by timestamp then insertion order.
    pub async fn list_messages(
        &self,
        session_id: &str,
        ctx: &CallContext,
    ) -> Result<Vec<Message>, StoreError> {
        let pk = PartitionKey::from(session_id);
        let query = DocumentQuery::messages(pk.clone());
        let mut messages = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = ctx
                .guard("list_messages", Some(&pk), self.options.timeout, async {
                    self.store
                        .query_documents(&query, continuation.as_deref(), self.options.page_size)
                        .await
                })
                .await?;
            for document in page.items {
                messages.push(expect_message("list_messages", &pk, document)?);
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(messages)
    }

    // --- Batches ---

    /// Upsert a non-empty, single-partition set of documents atomically.
    ///
    /// Validation happens before any I/O. Returns the stored documents in
    /// input order.
    pub async fn upsert_batch(
        &self,
        items: Vec<Document>,
        ctx: &CallContext,
    ) -> Result<Vec<Document>, StoreError> {
        let batch = TransactionalBatch::upsert_all(items)?;
        let pk = batch.partition_key().clone();
        let count = batch.len();
        let stored = ctx
            .guard("upsert_batch", Some(&pk), self.options.timeout, async {
                self.store.execute_batch(batch).await
            })
            .await?;
        debug!(session_id = %pk, count, "Batch upserted");
        Ok(stored)
    }

    /// Delete a session and all of its messages in one atomic batch.
    ///
    /// If any delete fails, nothing is deleted. Documents written to the
    /// partition after enumeration are reported as `residual`, not deleted.
    pub async fn delete_session_and_messages(
        &self,
        session_id: &str,
        ctx: &CallContext,
    ) -> Result<DeleteReport, StoreError> {
        let pk = PartitionKey::from(session_id);
        let ids = self.partition_ids(&pk, ctx).await?;
        if ids.is_empty() {
            warn!(session_id = %pk, "Delete requested for empty partition");
            return Ok(DeleteReport {
                deleted: 0,
                residual: 0,
            });
        }

        let deleted = ids.len();
        let batch = TransactionalBatch::delete_all(pk.clone(), ids)?;
        ctx.guard("delete_session", Some(&pk), self.options.timeout, async {
            self.store.execute_batch(batch).await
        })
        .await?;

        let residual = self.partition_ids(&pk, ctx).await?.len();
        if residual > 0 {
            warn!(
                session_id = %pk,
                residual,
                "Documents were written to the partition during deletion and remain"
            );
        }
        info!(session_id = %pk, deleted, "Session deleted");
        Ok(DeleteReport { deleted, residual })
    }

    async fn partition_ids(
        &self,
        pk: &PartitionKey,
        ctx: &CallContext,
    ) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = ctx
                .guard("enumerate_partition", Some(pk), self.options.timeout, async {
                    self.store
                        .query_ids(pk, continuation.as_deref(), self.options.page_size)
                        .await
                })
                .await?;
            ids.extend(page.items);
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(ids)
    }
}

fn expect_session(
    operation: &'static str,
    pk: &PartitionKey,
    document: Document,
) -> Result<Session, StoreError> {
    let id = document.id().to_string();
    document.into_session().ok_or_else(|| {
        StoreError::transport(
            operation,
            Some(pk.as_str()),
            format!("document '{id}' is not a Session"),
        )
    })
}

pub(crate) fn expect_message(
    operation: &'static str,
    pk: &PartitionKey,
    document: Document,
) -> Result<Message, StoreError> {
    let id = document.id().to_string();
    document.into_message().ok_or_else(|| {
        StoreError::transport(
            operation,
            Some(pk.as_str()),
            format!("document '{id}' is not a Message"),
        )
    })
}
