//! In-memory test doubles for the store and completion ports.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use convo_types::chat::{Document, PartitionKey, fixed_timestamp};
use convo_types::error::StoreError;
use convo_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

use crate::completion::client::CompletionClient;
use crate::store::document::{
    BatchOperation, DocumentQuery, DocumentStore, FeedPage, QueryOrder, TransactionalBatch,
};

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    etag: String,
    document: Document,
}

#[derive(Debug, Clone, Default)]
struct State {
    next_seq: u64,
    next_etag: u64,
    rows: Vec<Stored>,
}

impl State {
    fn fresh_etag(&mut self) -> String {
        self.next_etag += 1;
        format!("etag-{}", self.next_etag)
    }

    fn position(&self, pk: &PartitionKey, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| &row.document.partition_key() == pk && row.document.id() == id)
    }

    fn insert(&mut self, document: &Document) -> Document {
        self.next_seq += 1;
        let etag = self.fresh_etag();
        let document = document.clone().with_etag(Some(etag.clone()));
        self.rows.push(Stored {
            seq: self.next_seq,
            etag,
            document: document.clone(),
        });
        document
    }

    fn overwrite(&mut self, index: usize, document: &Document) -> Document {
        let etag = self.fresh_etag();
        let document = document.clone().with_etag(Some(etag.clone()));
        self.rows[index].etag = etag;
        self.rows[index].document = document.clone();
        document
    }
}

#[derive(Debug, Default)]
struct Faults {
    queries_before_failure: Option<usize>,
    batch_failure_index: Option<usize>,
    batch_delay: Option<Duration>,
}

/// `DocumentStore` kept in a vector, with fault injection.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    queries: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `pages` document queries succeed, then fail every later one.
    pub fn fail_query_after(&self, pages: usize) {
        let already = self.queries.load(Ordering::SeqCst);
        self.faults.lock().unwrap().queries_before_failure = Some(already + pages);
    }

    /// Make the operation at `index` of every later batch fail.
    pub fn fail_batch_at(&self, index: usize) {
        self.faults.lock().unwrap().batch_failure_index = Some(index);
    }

    pub fn delay_batches(&self, delay: Duration) {
        self.faults.lock().unwrap().batch_delay = Some(delay);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn partition_len(&self, pk: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.document.partition_key().as_str() == pk)
            .count()
    }

    fn page<T>(items: Vec<T>, continuation: Option<&str>, max: u32) -> Result<FeedPage<T>, StoreError> {
        let offset: usize = match continuation {
            Some(token) => token
                .parse()
                .map_err(|_| StoreError::validation("query", "malformed continuation"))?,
            None => 0,
        };
        let max = max as usize;
        let total = items.len();
        let items: Vec<T> = items.into_iter().skip(offset).take(max).collect();
        let next = offset + items.len();
        Ok(FeedPage {
            items,
            continuation: (next < total).then(|| next.to_string()),
        })
    }

    fn apply_batch(&self, batch: TransactionalBatch) -> Result<Vec<Document>, StoreError> {
        let failure_index = self.faults.lock().unwrap().batch_failure_index;
        let (pk, operations) = batch.into_parts();
        let mut state = self.state.lock().unwrap();
        let mut scratch = state.clone();
        let mut stored = Vec::new();

        let abort = |index: usize, reason: String| StoreError::BatchAborted {
            operation: "execute_batch",
            partition_key: pk.to_string(),
            operation_index: index,
            reason,
        };

        let mut outcome = Ok(());
        for (index, operation) in operations.iter().enumerate() {
            if failure_index == Some(index) {
                outcome = Err(abort(index, "injected failure".to_string()));
                break;
            }
            match operation {
                BatchOperation::Upsert { document, if_match } => {
                    match (scratch.position(&pk, document.id()), if_match) {
                        (Some(i), Some(tag)) if &scratch.rows[i].etag != tag => {
                            outcome = Err(abort(index, "precondition failed".to_string()));
                            break;
                        }
                        (Some(i), _) => stored.push(scratch.overwrite(i, document)),
                        (None, Some(_)) => {
                            outcome = Err(abort(index, "document not found".to_string()));
                            break;
                        }
                        (None, None) => stored.push(scratch.insert(document)),
                    }
                }
                BatchOperation::Delete { id } => match scratch.position(&pk, id) {
                    Some(i) => {
                        scratch.rows.remove(i);
                    }
                    None => {
                        outcome = Err(abort(index, format!("document '{id}' not found")));
                        break;
                    }
                },
            }
        }

        match outcome {
            Ok(()) => {
                *state = scratch;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(stored)
            }
            Err(err) => Err(err),
        }
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn create_item(&self, document: &Document) -> Result<Document, StoreError> {
        let mut state = self.state.lock().unwrap();
        let pk = document.partition_key();
        if state.position(&pk, document.id()).is_some() {
            return Err(StoreError::Conflict {
                operation: "create_item",
                partition_key: pk.to_string(),
                id: document.id().to_string(),
                reason: "document already exists".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(state.insert(document))
    }

    async fn read_item(&self, pk: &PartitionKey, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.position(pk, id).map(|i| state.rows[i].document.clone()))
    }

    async fn replace_item(
        &self,
        document: &Document,
        if_match: Option<&str>,
    ) -> Result<Document, StoreError> {
        let mut state = self.state.lock().unwrap();
        let pk = document.partition_key();
        let Some(index) = state.position(&pk, document.id()) else {
            return Err(StoreError::NotFound {
                operation: "replace_item",
                partition_key: pk.to_string(),
                id: document.id().to_string(),
            });
        };
        if let Some(tag) = if_match {
            if state.rows[index].etag != tag {
                return Err(StoreError::Conflict {
                    operation: "replace_item",
                    partition_key: pk.to_string(),
                    id: document.id().to_string(),
                    reason: "precondition failed".to_string(),
                });
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(state.overwrite(index, document))
    }

    async fn query_documents(
        &self,
        query: &DocumentQuery,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> Result<FeedPage<Document>, StoreError> {
        let issued = self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.faults.lock().unwrap().queries_before_failure {
            if issued >= limit {
                return Err(StoreError::transport(
                    "query_documents",
                    None,
                    "injected query failure",
                ));
            }
        }

        let state = self.state.lock().unwrap();
        let mut rows: Vec<&Stored> = state
            .rows
            .iter()
            .filter(|row| {
                query
                    .partition_key
                    .as_ref()
                    .is_none_or(|pk| &row.document.partition_key() == pk)
                    && query.doc_type.is_none_or(|t| row.document.doc_type() == t)
            })
            .collect();
        match query.order {
            QueryOrder::Insertion => rows.sort_by_key(|row| row.seq),
            QueryOrder::Timestamp => rows.sort_by_key(|row| (sort_timestamp(&row.document), row.seq)),
        }
        let items = rows.into_iter().map(|row| row.document.clone()).collect();
        Self::page(items, continuation, max_item_count)
    }

    async fn query_ids(
        &self,
        pk: &PartitionKey,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> Result<FeedPage<String>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<&Stored> = state
            .rows
            .iter()
            .filter(|row| &row.document.partition_key() == pk)
            .collect();
        rows.sort_by_key(|row| row.seq);
        let ids = rows.into_iter().map(|row| row.document.id().to_string()).collect();
        Self::page(ids, continuation, max_item_count)
    }

    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<Vec<Document>, StoreError> {
        let delay = self.faults.lock().unwrap().batch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.apply_batch(batch)
    }
}

fn sort_timestamp(document: &Document) -> String {
    match document {
        Document::Message(m) => fixed_timestamp::format(&m.timestamp),
        Document::Session(_) => String::new(),
    }
}

/// Scripted result of one completion call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply {
        text: String,
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    Fail(String),
    Empty,
    /// Never resolves; exercises cancellation.
    Hang,
}

impl Scripted {
    pub fn reply(text: &str, completion_tokens: u32) -> Self {
        Scripted::Reply {
            text: text.to_string(),
            prompt_tokens: 0,
            completion_tokens,
        }
    }
}

/// `CompletionClient` that replays a script and records every request.
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionClient {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionClient for ScriptedCompletionClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply {
                text,
                prompt_tokens,
                completion_tokens,
            }) => Ok(CompletionResponse {
                text,
                prompt_tokens,
                completion_tokens,
            }),
            Some(Scripted::Fail(message)) => Err(CompletionError::Provider { message }),
            Some(Scripted::Empty) | None => Err(CompletionError::EmptyResponse),
            Some(Scripted::Hang) => std::future::pending().await,
        }
    }
}
