//! Cancellation and deadline handling for store and completion calls.
//!
//! `CallContext` is passed to every I/O operation. Its cancellation token
//! forms a tree: cancelling a parent cancels every child derived from it.
//!
//! Cancellation or a missed deadline drops the in-flight future. For a
//! transactional batch this means no partial effects, but the caller cannot
//! tell "never sent" apart from "committed, response lost" without
//! re-reading the partition.

use std::future::Future;
use std::time::Duration;

use convo_types::chat::PartitionKey;
use convo_types::error::StoreError;
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus optional deadline override for one call tree.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub cancellation: CancellationToken,
    /// Overrides the store's configured per-operation timeout.
    pub timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    /// Derive a context that is cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            timeout: self.timeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run `fut` until it finishes, the token fires, or the deadline passes.
    pub(crate) async fn guard<T, F>(
        &self,
        operation: &'static str,
        partition_key: Option<&PartitionKey>,
        default_timeout: Duration,
        fut: F,
    ) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.timeout.unwrap_or(default_timeout);
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(StoreError::Cancelled {
                operation,
                partition_key: partition_key.map(|pk| pk.to_string()),
            }),
            result = tokio::time::timeout(timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => Err(StoreError::TimedOut {
                    operation,
                    partition_key: partition_key.map(|pk| pk.to_string()),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = CallContext::new();
        let value = ctx
            .guard("read_item", None, Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_reports_cancellation() {
        let ctx = CallContext::new();
        ctx.cancel();
        let pk = PartitionKey::from("s1");
        let err = ctx
            .guard("execute_batch", Some(&pk), Duration::from_secs(1), async {
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        match err {
            StoreError::Cancelled {
                operation,
                partition_key,
            } => {
                assert_eq!(operation, "execute_batch");
                assert_eq!(partition_key.as_deref(), Some("s1"));
            }
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_guard_reports_timeout() {
        let ctx = CallContext::with_timeout(Duration::from_millis(10));
        let err = ctx
            .guard("query_documents", None, Duration::from_secs(30), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TimedOut { timeout_ms: 10, .. }));
    }

    #[test]
    fn test_child_cancelled_with_parent() {
        let parent = CallContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_parent_survives_child_cancel() {
        let parent = CallContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }
}
