//! DocumentStore trait definition.
//!
//! The port to a partitioned document database: point writes and reads by
//! `(partition key, id)`, paged queries with an opaque continuation token,
//! and transactional batches scoped to a single partition. Follows the same
//! RPITIT pattern as the other ports in this crate.

use convo_types::chat::{Document, DocumentType, PartitionKey};
use convo_types::error::StoreError;

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` when the results are exhausted.
    pub continuation: Option<String>,
}

impl<T> FeedPage<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            continuation: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

/// Result ordering of a [`DocumentQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Order in which the store first observed each document.
    Insertion,
    /// Ascending `timestamp`, ties broken by insertion order.
    Timestamp,
}

/// Backend-neutral description of a document query.
///
/// Adapters translate this into their own query dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Restrict to one partition; `None` is a cross-partition query.
    pub partition_key: Option<PartitionKey>,
    pub doc_type: Option<DocumentType>,
    pub order: QueryOrder,
    pub distinct: bool,
}

impl DocumentQuery {
    /// Every session document, across all partitions.
    pub fn sessions() -> Self {
        Self {
            partition_key: None,
            doc_type: Some(DocumentType::Session),
            order: QueryOrder::Insertion,
            distinct: true,
        }
    }

    /// Every message document of one partition, in timestamp order.
    pub fn messages(partition_key: PartitionKey) -> Self {
        Self {
            partition_key: Some(partition_key),
            doc_type: Some(DocumentType::Message),
            order: QueryOrder::Timestamp,
            distinct: false,
        }
    }

    /// Every document of one partition regardless of type.
    pub fn partition(partition_key: PartitionKey) -> Self {
        Self {
            partition_key: Some(partition_key),
            doc_type: None,
            order: QueryOrder::Insertion,
            distinct: false,
        }
    }
}

/// A single staged operation of a [`TransactionalBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Insert or fully replace; `if_match` guards the replace with a concurrency token.
    Upsert {
        document: Document,
        if_match: Option<String>,
    },
    /// Delete by id; a missing document fails the batch.
    Delete { id: String },
}

/// A set of operations applied atomically within one partition.
///
/// Only constructible through validating constructors, so a cross-partition
/// or empty batch cannot reach a store.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionalBatch {
    partition_key: PartitionKey,
    operations: Vec<BatchOperation>,
}

impl TransactionalBatch {
    /// Stage an upsert for every document.
    ///
    /// Each upsert carries the document's own `_etag` as its `if_match`
    /// guard. Fails with `Validation` when `documents` is empty or spans
    /// more than one partition key.
    pub fn upsert_all(documents: Vec<Document>) -> Result<Self, StoreError> {
        let Some(first) = documents.first() else {
            return Err(StoreError::validation(
                "upsert_batch",
                "a transactional batch needs at least one document",
            ));
        };
        let partition_key = first.partition_key();

        if let Some((index, stray)) = documents
            .iter()
            .enumerate()
            .find(|(_, doc)| doc.partition_key() != partition_key)
        {
            return Err(StoreError::validation(
                "upsert_batch",
                format!(
                    "all documents must share partition key '{partition_key}', \
                     but document {index} ('{}') has '{}'",
                    stray.id(),
                    stray.partition_key()
                ),
            ));
        }

        if let Some(index) = documents.iter().position(|doc| doc.id().is_empty()) {
            return Err(StoreError::validation(
                "upsert_batch",
                format!("document {index} has an empty id"),
            ));
        }

        let operations = documents
            .into_iter()
            .map(|document| BatchOperation::Upsert {
                if_match: document.etag().map(str::to_string),
                document,
            })
            .collect();

        Ok(Self {
            partition_key,
            operations,
        })
    }

    /// Stage a delete for every id in the partition.
    pub fn delete_all(partition_key: PartitionKey, ids: Vec<String>) -> Result<Self, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::validation(
                "delete_batch",
                "a transactional batch needs at least one operation",
            ));
        }
        let operations = ids
            .into_iter()
            .map(|id| BatchOperation::Delete { id })
            .collect();
        Ok(Self {
            partition_key,
            operations,
        })
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_parts(self) -> (PartitionKey, Vec<BatchOperation>) {
        (self.partition_key, self.operations)
    }
}

/// Port to a partitioned document database.
///
/// Implementations live in convo-infra (e.g., `SqliteDocumentStore`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. `Conflict` if `(partition key, id)` already exists.
    ///
    /// Returns the stored document with its fresh `_etag`.
    fn create_item(
        &self,
        document: &Document,
    ) -> impl std::future::Future<Output = Result<Document, StoreError>> + Send;

    /// Point read by partition key and id.
    fn read_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Full replace. `NotFound` if absent; `Conflict` if `if_match` is given
    /// and differs from the stored concurrency token.
    fn replace_item(
        &self,
        document: &Document,
        if_match: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Document, StoreError>> + Send;

    /// Fetch one page of documents matching `query`.
    fn query_documents(
        &self,
        query: &DocumentQuery,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> impl std::future::Future<Output = Result<FeedPage<Document>, StoreError>> + Send;

    /// Fetch one page of document ids in a partition, in insertion order.
    fn query_ids(
        &self,
        partition_key: &PartitionKey,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> impl std::future::Future<Output = Result<FeedPage<String>, StoreError>> + Send;

    /// Apply every operation of `batch` atomically.
    ///
    /// Returns the stored upserted documents in operation order. If any
    /// operation fails nothing is applied and the error is `BatchAborted`.
    fn execute_batch(
        &self,
        batch: TransactionalBatch,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, StoreError>> + Send;
}
