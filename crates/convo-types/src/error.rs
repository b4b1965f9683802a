use thiserror::Error;

/// Boxed underlying cause of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from document store and conversation store operations.
///
/// Every variant names the operation that failed; variants tied to a
/// partition also carry its key so callers can decide whether to retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A caller precondition was violated; no I/O was attempted.
    #[error("{operation}: validation failed: {reason}")]
    Validation {
        operation: &'static str,
        reason: String,
    },

    /// Identity or concurrency-token collision.
    #[error("{operation}: conflict on '{id}' in partition '{partition_key}': {reason}")]
    Conflict {
        operation: &'static str,
        partition_key: String,
        id: String,
        reason: String,
    },

    /// The target document (or database/container) does not exist.
    #[error("{operation}: '{id}' not found in partition '{partition_key}'")]
    NotFound {
        operation: &'static str,
        partition_key: String,
        id: String,
    },

    /// The configured database or container does not exist.
    #[error("{operation}: {kind} '{name}' does not exist")]
    MissingResource {
        operation: &'static str,
        kind: &'static str,
        name: String,
    },

    /// One member of an atomic batch failed; the whole batch was rolled back.
    #[error(
        "{operation}: transactional batch on partition '{partition_key}' aborted at operation {operation_index}: {reason}"
    )]
    BatchAborted {
        operation: &'static str,
        partition_key: String,
        operation_index: usize,
        reason: String,
    },

    /// Network, timeout, or server-side failure.
    #[error("{operation}: transport error: {source}")]
    Transport {
        operation: &'static str,
        partition_key: Option<String>,
        #[source]
        source: BoxError,
    },

    /// The store rejected the supplied credential.
    #[error("{operation}: unauthorized: {reason}")]
    Unauthorized {
        operation: &'static str,
        reason: String,
    },

    /// The caller cancelled the operation before a response arrived.
    ///
    /// A write may still have been committed server-side; re-read to find out.
    #[error("{operation}: cancelled before completion (outcome unknown, re-query to confirm)")]
    Cancelled {
        operation: &'static str,
        partition_key: Option<String>,
    },

    /// The operation deadline elapsed before a response arrived.
    ///
    /// Same ambiguity as [`StoreError::Cancelled`].
    #[error("{operation}: deadline of {timeout_ms}ms exceeded (outcome unknown, re-query to confirm)")]
    TimedOut {
        operation: &'static str,
        partition_key: Option<String>,
        timeout_ms: u64,
    },
}

impl StoreError {
    pub fn validation(operation: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            operation,
            reason: reason.into(),
        }
    }

    pub fn transport(
        operation: &'static str,
        partition_key: Option<&str>,
        source: impl Into<BoxError>,
    ) -> Self {
        StoreError::Transport {
            operation,
            partition_key: partition_key.map(str::to_string),
            source: source.into(),
        }
    }

    /// Name of the operation that produced this error.
    pub fn operation(&self) -> &'static str {
        match self {
            StoreError::Validation { operation, .. }
            | StoreError::Conflict { operation, .. }
            | StoreError::NotFound { operation, .. }
            | StoreError::MissingResource { operation, .. }
            | StoreError::BatchAborted { operation, .. }
            | StoreError::Transport { operation, .. }
            | StoreError::Unauthorized { operation, .. }
            | StoreError::Cancelled { operation, .. }
            | StoreError::TimedOut { operation, .. } => operation,
        }
    }

    /// Whether the outcome of a write is unknown to the caller.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            StoreError::Cancelled { .. } | StoreError::TimedOut { .. } | StoreError::Transport { .. }
        )
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}
