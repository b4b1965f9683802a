//! SQLite partitioned document store.
//!
//! Implements `DocumentStore` from `convo-core`. One database file holds any
//! number of containers; each container is a table keyed by
//! `(partition_key, id)` with an autoincrement `seq` recording insertion
//! order. Documents are stored as JSON with the concurrency token kept in a
//! separate `etag` column.

use std::path::{Path, PathBuf};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use sqlx::Row;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use tracing::{debug, info};
use uuid::Uuid;

use convo_core::store::document::{
    BatchOperation, DocumentQuery, DocumentStore, FeedPage, TransactionalBatch,
};
use convo_types::chat::{Document, PartitionKey};
use convo_types::config::StoreConfig;
use convo_types::error::StoreError;

use super::pool::DatabasePool;
use super::query::{
    QueryDefinition, QueryValue, decode_continuation, encode_continuation, render_document_query,
    render_id_query,
};

/// SQLite-backed implementation of `DocumentStore`.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: DatabasePool,
    container: String,
}

impl SqliteDocumentStore {
    /// Create the database and container if needed, then connect.
    ///
    /// Records the account key digest on first provisioning. Provisioning an
    /// existing database with a different key fails with `Unauthorized`.
    pub async fn provision(config: &StoreConfig) -> Result<Self, StoreError> {
        let target = StoreTarget::resolve(config)?;
        if let Some(dir) = target.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::transport("provision", None, e))?;
        }

        let pool = DatabasePool::open(&target.path, true)
            .await
            .map_err(|e| StoreError::transport("provision", None, e))?;

        let digest = key_digest(&target.key);
        sqlx::query(
            "INSERT INTO _account (id, key_digest, created_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&digest)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool.writer)
        .await
        .map_err(|e| StoreError::transport("provision", None, e))?;
        verify_key(&pool, &digest, "provision").await?;

        let table = &target.container;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                partition_key TEXT NOT NULL,
                id            TEXT NOT NULL,
                doc_type      TEXT NOT NULL,
                body          TEXT NOT NULL,
                etag          TEXT NOT NULL,
                ts            INTEGER NOT NULL,
                UNIQUE (partition_key, id)
            )"
        );
        sqlx::query(&ddl)
            .execute(&pool.writer)
            .await
            .map_err(|e| StoreError::transport("provision", None, e))?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS \"{table}_type_seq\" ON \"{table}\" (doc_type, seq)"
        ))
        .execute(&pool.writer)
        .await
        .map_err(|e| StoreError::transport("provision", None, e))?;
        sqlx::query("INSERT OR IGNORE INTO _containers (name, created_at) VALUES (?1, ?2)")
            .bind(table)
            .bind(Utc::now().to_rfc3339())
            .execute(&pool.writer)
            .await
            .map_err(|e| StoreError::transport("provision", None, e))?;

        info!(
            database = %target.path.display(),
            container = %table,
            "Document store provisioned"
        );
        Ok(Self {
            pool,
            container: target.container,
        })
    }

    /// Connect to an existing database and container.
    ///
    /// Never creates anything: a missing database file or container fails
    /// with `MissingResource`, a wrong key with `Unauthorized`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let target = StoreTarget::resolve(config)?;
        if !tokio::fs::try_exists(&target.path).await.unwrap_or(false) {
            return Err(StoreError::MissingResource {
                operation: "connect",
                kind: "database",
                name: target.path.display().to_string(),
            });
        }

        let pool = DatabasePool::open(&target.path, false)
            .await
            .map_err(|e| StoreError::transport("connect", None, e))?;
        verify_key(&pool, &key_digest(&target.key), "connect").await?;

        let registered: Option<(String,)> =
            sqlx::query_as("SELECT name FROM _containers WHERE name = ?1")
                .bind(&target.container)
                .fetch_optional(&pool.reader)
                .await
                .map_err(|e| StoreError::transport("connect", None, e))?;
        if registered.is_none() {
            pool.close().await;
            return Err(StoreError::MissingResource {
                operation: "connect",
                kind: "container",
                name: target.container,
            });
        }

        debug!(database = %target.path.display(), container = %target.container, "Document store connected");
        Ok(Self {
            pool,
            container: target.container,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    async fn fetch_page(
        &self,
        definition: QueryDefinition,
        operation: &'static str,
        partition_key: Option<&PartitionKey>,
    ) -> Result<Vec<SqliteRow>, StoreError> {
        let (sql, values) = definition.compile()?;
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| StoreError::transport(operation, partition_key.map(|pk| pk.as_str()), e))
    }
}

/// Resolved location of a database and container.
struct StoreTarget {
    path: PathBuf,
    container: String,
    key: SecretString,
}

impl StoreTarget {
    fn resolve(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = config.endpoint.trim();
        let endpoint = endpoint.strip_prefix("sqlite://").unwrap_or(endpoint);
        if endpoint.is_empty() {
            return Err(StoreError::validation("connect", "store endpoint must not be empty"));
        }
        if !is_identifier(&config.database_name) {
            return Err(StoreError::validation(
                "connect",
                format!(
                    "database name '{}' must start with a letter and contain only letters, digits and '_'",
                    config.database_name
                ),
            ));
        }
        if !is_identifier(&config.container_name) {
            return Err(StoreError::validation(
                "connect",
                format!(
                    "container name '{}' must start with a letter and contain only letters, digits and '_'",
                    config.container_name
                ),
            ));
        }
        let key = match &config.key {
            Some(key) if !key.expose_secret().is_empty() => key.clone(),
            _ => {
                return Err(StoreError::Unauthorized {
                    operation: "connect",
                    reason: "no account key configured".to_string(),
                });
            }
        };

        Ok(Self {
            path: Path::new(endpoint).join(format!("{}.db", config.database_name)),
            container: config.container_name.clone(),
            key,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn key_digest(key: &SecretString) -> String {
    format!("{:x}", Sha256::digest(key.expose_secret().as_bytes()))
}

async fn verify_key(
    pool: &DatabasePool,
    digest: &str,
    operation: &'static str,
) -> Result<(), StoreError> {
    let stored: Option<(String,)> = sqlx::query_as("SELECT key_digest FROM _account WHERE id = 1")
        .fetch_optional(&pool.reader)
        .await
        .map_err(|e| StoreError::transport(operation, None, e))?;
    match stored {
        Some((stored,)) if stored == digest => Ok(()),
        Some(_) => Err(StoreError::Unauthorized {
            operation,
            reason: "account key does not match".to_string(),
        }),
        None => Err(StoreError::Unauthorized {
            operation,
            reason: "database has no account record".to_string(),
        }),
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    value: QueryValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match value {
        QueryValue::Text(text) => query.bind(text),
        QueryValue::Integer(n) => query.bind(n),
    }
}

/// JSON body of a document without its concurrency token.
fn encode_body(document: &Document, operation: &'static str) -> Result<String, StoreError> {
    serde_json::to_string(&document.clone().with_etag(None)).map_err(|e| {
        StoreError::validation(operation, format!("document cannot be serialized: {e}"))
    })
}

fn decode_row(row: &SqliteRow, operation: &'static str) -> Result<Document, StoreError> {
    let body: String = row
        .try_get("body")
        .map_err(|e| StoreError::transport(operation, None, e))?;
    let etag: String = row
        .try_get("etag")
        .map_err(|e| StoreError::transport(operation, None, e))?;
    let document: Document = serde_json::from_str(&body)
        .map_err(|e| StoreError::transport(operation, None, e))?;
    Ok(document.with_etag(Some(etag)))
}

fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Build a page from `limit + 1` fetched rows.
fn into_page<T>(mut items: Vec<T>, offset: i64, max_item_count: u32) -> FeedPage<T> {
    let max = max_item_count as usize;
    if items.len() > max {
        items.truncate(max);
        FeedPage {
            items,
            continuation: Some(encode_continuation(offset + i64::from(max_item_count))),
        }
    } else {
        FeedPage::last(items)
    }
}

fn page_size(max_item_count: u32, operation: &'static str) -> Result<i64, StoreError> {
    if max_item_count == 0 {
        return Err(StoreError::validation(operation, "max item count must be positive"));
    }
    Ok(i64::from(max_item_count) + 1)
}

fn map_write_error(
    err: sqlx::Error,
    operation: &'static str,
    partition_key: &PartitionKey,
    id: &str,
) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            operation,
            partition_key: partition_key.to_string(),
            id: id.to_string(),
            reason: "document already exists".to_string(),
        },
        _ => StoreError::transport(operation, Some(partition_key.as_str()), err),
    }
}

impl DocumentStore for SqliteDocumentStore {
    async fn create_item(&self, document: &Document) -> Result<Document, StoreError> {
        let pk = document.partition_key();
        let body = encode_body(document, "create_item")?;
        let etag = new_etag();

        sqlx::query(&format!(
            "INSERT INTO \"{}\" (partition_key, id, doc_type, body, etag, ts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.container
        ))
        .bind(pk.as_str())
        .bind(document.id())
        .bind(document.doc_type().as_str())
        .bind(&body)
        .bind(&etag)
        .bind(Utc::now().timestamp())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| map_write_error(e, "create_item", &pk, document.id()))?;

        Ok(document.clone().with_etag(Some(etag)))
    }

    async fn read_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT body, etag FROM \"{}\" WHERE partition_key = ?1 AND id = ?2",
            self.container
        ))
        .bind(partition_key.as_str())
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| StoreError::transport("read_item", Some(partition_key.as_str()), e))?;

        row.map(|r| decode_row(&r, "read_item")).transpose()
    }

    async fn replace_item(
        &self,
        document: &Document,
        if_match: Option<&str>,
    ) -> Result<Document, StoreError> {
        let pk = document.partition_key();
        let id = document.id();
        let body = encode_body(document, "replace_item")?;
        let transport = |e: sqlx::Error| StoreError::transport("replace_item", Some(pk.as_str()), e);

        let mut tx = self.pool.writer.begin().await.map_err(transport)?;
        let current: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT etag FROM \"{}\" WHERE partition_key = ?1 AND id = ?2",
            self.container
        ))
        .bind(pk.as_str())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(transport)?;

        match (current, if_match) {
            (None, _) => {
                return Err(StoreError::NotFound {
                    operation: "replace_item",
                    partition_key: pk.to_string(),
                    id: id.to_string(),
                });
            }
            (Some((stored,)), Some(expected)) if stored != expected => {
                return Err(StoreError::Conflict {
                    operation: "replace_item",
                    partition_key: pk.to_string(),
                    id: id.to_string(),
                    reason: "concurrency token does not match".to_string(),
                });
            }
            _ => {}
        }

        let etag = new_etag();
        sqlx::query(&format!(
            "UPDATE \"{}\" SET doc_type = ?1, body = ?2, etag = ?3, ts = ?4 \
             WHERE partition_key = ?5 AND id = ?6",
            self.container
        ))
        .bind(document.doc_type().as_str())
        .bind(&body)
        .bind(&etag)
        .bind(Utc::now().timestamp())
        .bind(pk.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(transport)?;
        tx.commit().await.map_err(transport)?;

        Ok(document.clone().with_etag(Some(etag)))
    }

    async fn query_documents(
        &self,
        query: &DocumentQuery,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> Result<FeedPage<Document>, StoreError> {
        let offset = decode_continuation(continuation)?;
        let limit = page_size(max_item_count, "query_documents")?;
        let definition = render_document_query(&self.container, query, offset, limit);
        let rows = self
            .fetch_page(definition, "query_documents", query.partition_key.as_ref())
            .await?;
        let documents = rows
            .iter()
            .map(|row| decode_row(row, "query_documents"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(into_page(documents, offset, max_item_count))
    }

    async fn query_ids(
        &self,
        partition_key: &PartitionKey,
        continuation: Option<&str>,
        max_item_count: u32,
    ) -> Result<FeedPage<String>, StoreError> {
        let offset = decode_continuation(continuation)?;
        let limit = page_size(max_item_count, "query_ids")?;
        let definition = render_id_query(&self.container, partition_key.as_str(), offset, limit);
        let rows = self
            .fetch_page(definition, "query_ids", Some(partition_key))
            .await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::transport("query_ids", Some(partition_key.as_str()), e))?;
        Ok(into_page(ids, offset, max_item_count))
    }

    async fn execute_batch(&self, batch: TransactionalBatch) -> Result<Vec<Document>, StoreError> {
        let (pk, operations) = batch.into_parts();
        let abort = |index: usize, reason: String| StoreError::BatchAborted {
            operation: "execute_batch",
            partition_key: pk.to_string(),
            operation_index: index,
            reason,
        };

        // Dropping `tx` without commit rolls back every staged operation.
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| StoreError::transport("execute_batch", Some(pk.as_str()), e))?;
        let mut stored = Vec::new();

        for (index, operation) in operations.into_iter().enumerate() {
            match operation {
                BatchOperation::Upsert { document, if_match } => {
                    if let Some(expected) = if_match.as_deref() {
                        let current: Option<(String,)> = sqlx::query_as(&format!(
                            "SELECT etag FROM \"{}\" WHERE partition_key = ?1 AND id = ?2",
                            self.container
                        ))
                        .bind(pk.as_str())
                        .bind(document.id())
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| abort(index, e.to_string()))?;
                        match current {
                            None => {
                                return Err(abort(
                                    index,
                                    format!("document '{}' not found", document.id()),
                                ));
                            }
                            Some((tag,)) if tag != expected => {
                                return Err(abort(
                                    index,
                                    format!(
                                        "concurrency token mismatch on '{}'",
                                        document.id()
                                    ),
                                ));
                            }
                            Some(_) => {}
                        }
                    }

                    let body = encode_body(&document, "execute_batch")
                        .map_err(|e| abort(index, e.to_string()))?;
                    let etag = new_etag();
                    sqlx::query(&format!(
                        "INSERT INTO \"{}\" (partition_key, id, doc_type, body, etag, ts) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                         ON CONFLICT (partition_key, id) DO UPDATE SET \
                         doc_type = excluded.doc_type, body = excluded.body, \
                         etag = excluded.etag, ts = excluded.ts",
                        self.container
                    ))
                    .bind(pk.as_str())
                    .bind(document.id())
                    .bind(document.doc_type().as_str())
                    .bind(&body)
                    .bind(&etag)
                    .bind(Utc::now().timestamp())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| abort(index, e.to_string()))?;
                    stored.push(document.with_etag(Some(etag)));
                }
                BatchOperation::Delete { id } => {
                    let result = sqlx::query(&format!(
                        "DELETE FROM \"{}\" WHERE partition_key = ?1 AND id = ?2",
                        self.container
                    ))
                    .bind(pk.as_str())
                    .bind(&id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| abort(index, e.to_string()))?;
                    if result.rows_affected() == 0 {
                        return Err(abort(index, format!("document '{id}' not found")));
                    }
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::transport("execute_batch", Some(pk.as_str()), e))?;
        debug!(partition_key = %pk, operations = stored.len(), "Batch committed");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_types::chat::{Message, Sender, Session};

    fn config(dir: &Path) -> StoreConfig {
        StoreConfig {
            endpoint: dir.display().to_string(),
            key: Some(SecretString::from("account-key")),
            database_name: "chat".to_string(),
            container_name: "conversations".to_string(),
            ..StoreConfig::default()
        }
    }

    async fn test_store() -> SqliteDocumentStore {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteDocumentStore::provision(&config(dir.path())).await.unwrap();
        // Leak the tempdir so it lives as long as the test
        std::mem::forget(dir);
        store
    }

    fn message(session: &str, id: &str, text: &str) -> Document {
        let mut m = Message::new(session, Sender::User, text, 0);
        m.id = id.to_string();
        m.into()
    }

    #[tokio::test]
    async fn test_connect_missing_database_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteDocumentStore::connect(&config(dir.path()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::MissingResource { kind: "database", .. }));
        assert!(!dir.path().join("chat.db").exists());
    }

    #[tokio::test]
    async fn test_connect_missing_container_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        SqliteDocumentStore::provision(&config(dir.path())).await.unwrap();
        let mut other = config(dir.path());
        other.container_name = "elsewhere".to_string();
        let err = SqliteDocumentStore::connect(&other).await.err().unwrap();
        assert!(matches!(err, StoreError::MissingResource { kind: "container", .. }));
    }

    #[tokio::test]
    async fn test_connect_wrong_key_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        SqliteDocumentStore::provision(&config(dir.path())).await.unwrap();
        let mut wrong = config(dir.path());
        wrong.key = Some(SecretString::from("not-the-key"));
        let err = SqliteDocumentStore::connect(&wrong).await.err().unwrap();
        assert!(matches!(err, StoreError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_connect_after_provision() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.endpoint = format!("sqlite://{}", dir.path().display());
        SqliteDocumentStore::provision(&cfg).await.unwrap();
        let store = SqliteDocumentStore::connect(&cfg).await.unwrap();
        assert_eq!(store.container(), "conversations");
    }

    #[tokio::test]
    async fn test_invalid_container_name_is_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.container_name = "bad\"name".to_string();
        let err = SqliteDocumentStore::provision(&cfg).await.err().unwrap();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_read_and_conflict() {
        let store = test_store().await;
        let doc = Document::from(Session::with_id("s1", "chat"));

        let created = store.create_item(&doc).await.unwrap();
        assert!(created.etag().is_some());

        let read = store.read_item(&"s1".into(), "s1").await.unwrap().unwrap();
        assert_eq!(read, created);

        let err = store.create_item(&doc).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_same_id_in_different_partitions() {
        let store = test_store().await;
        store.create_item(&message("s1", "m1", "a")).await.unwrap();
        store.create_item(&message("s2", "m1", "b")).await.unwrap();
        assert!(store.read_item(&"s2".into(), "m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_checks_etag() {
        let store = test_store().await;
        let created = store
            .create_item(&Session::with_id("s1", "chat").into())
            .await
            .unwrap();
        let stale = created.etag().map(str::to_string);

        let mut renamed = created.clone().into_session().unwrap();
        renamed.name = "renamed".to_string();
        let replaced = store
            .replace_item(&renamed.clone().into(), stale.as_deref())
            .await
            .unwrap();
        assert_ne!(replaced.etag(), stale.as_deref());

        let err = store
            .replace_item(&renamed.into(), stale.as_deref())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let missing = store
            .replace_item(&Session::with_id("nope", "x").into(), None)
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_query_pages_with_continuation() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .create_item(&Session::with_id(format!("s{i}"), "chat").into())
                .await
                .unwrap();
        }

        let query = DocumentQuery::sessions();
        let first = store.query_documents(&query, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more());

        let mut all = first.items;
        let mut token = first.continuation;
        while let Some(t) = token {
            let page = store.query_documents(&query, Some(&t), 2).await.unwrap();
            all.extend(page.items);
            token = page.continuation;
        }
        let ids: Vec<&str> = all.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn test_exact_page_has_no_continuation() {
        let store = test_store().await;
        for i in 0..2 {
            store
                .create_item(&Session::with_id(format!("s{i}"), "chat").into())
                .await
                .unwrap();
        }
        let page = store
            .query_documents(&DocumentQuery::sessions(), None, 2)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.continuation.is_none());
    }

    #[tokio::test]
    async fn test_malformed_continuation_rejected() {
        let store = test_store().await;
        let err = store
            .query_documents(&DocumentQuery::sessions(), Some("garbage!"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = test_store().await;
        store.create_item(&message("s1", "m1", "keep")).await.unwrap();

        // The second delete targets a missing document, so the first must not stick.
        let batch = TransactionalBatch::delete_all("s1".into(), vec!["m1".into(), "ghost".into()])
            .unwrap();
        let err = store.execute_batch(batch).await.unwrap_err();
        match err {
            StoreError::BatchAborted {
                partition_key,
                operation_index,
                ..
            } => {
                assert_eq!(partition_key, "s1");
                assert_eq!(operation_index, 1);
            }
            other => panic!("expected BatchAborted, got {other:?}"),
        }
        assert!(store.read_item(&"s1".into(), "m1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_upsert_keeps_insertion_sequence() {
        let store = test_store().await;
        store.create_item(&message("s1", "a", "first")).await.unwrap();
        store.create_item(&message("s1", "b", "second")).await.unwrap();

        let batch = TransactionalBatch::upsert_all(vec![message("s1", "a", "edited")]).unwrap();
        store.execute_batch(batch).await.unwrap();

        let page = store
            .query_documents(&DocumentQuery::partition("s1".into()), None, 10)
            .await
            .unwrap();
        let ids: Vec<&str> = page.items.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_batch_upsert_stale_etag_aborts() {
        let store = test_store().await;
        let created = store
            .create_item(&Session::with_id("s1", "chat").into())
            .await
            .unwrap();
        let stale = created.clone().with_etag(Some("stale".to_string()));
        let batch = TransactionalBatch::upsert_all(vec![stale]).unwrap();
        let err = store.execute_batch(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchAborted { .. }));
        assert_eq!(store.read_item(&"s1".into(), "s1").await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_query_ids_scoped_to_partition() {
        let store = test_store().await;
        store.create_item(&Session::with_id("s1", "chat").into()).await.unwrap();
        store.create_item(&message("s1", "m1", "a")).await.unwrap();
        store.create_item(&message("s2", "m2", "b")).await.unwrap();

        let page = store.query_ids(&"s1".into(), None, 10).await.unwrap();
        assert_eq!(page.items, vec!["s1".to_string(), "m1".to_string()]);
    }
}
