//! SQLite document store.
//!
//! A partitioned JSON document store backed by SQLite with WAL mode and split
//! read/write connection pools. Each container is one table keyed by
//! `(partition_key, id)`.

pub mod pool;
pub mod query;
pub mod store;
