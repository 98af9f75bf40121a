use courier_lock::LockError;
use courier_storage::StorageError;
use courier_transport::TransportError;

/// Errors raised by the relay core.
///
/// Lock contention is the one *expected* failure: callers surface it as a
/// "transfer already in flight" conflict rather than a crash. Everything
/// else is fatal for the current invocation; the orchestration layer decides
/// whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no routing mapping for bucket `{bucket}` prefix `{folder}`")]
    MissingRoute { bucket: String, folder: String },

    #[error("no inbound location configured for mailbox `{mailbox}`")]
    MissingInboundLocation { mailbox: String },

    #[error("required parameter `{name}` missing from object metadata")]
    MissingParameter { name: String },

    #[error("source object `{key}` in bucket `{bucket}` is missing or empty")]
    SourceNotFound { bucket: String, key: String },

    #[error("job `{context}` was re-invoked after completing")]
    AlreadyComplete { context: String },

    #[error("all bytes of `{key}` consumed at chunk {chunk_number} of {total_chunks}")]
    MaxBytesExceeded {
        key: String,
        chunk_number: u32,
        total_chunks: u32,
    },

    #[error("corrupted continuation payload: {reason}")]
    InvalidContinuation { reason: String },

    #[error("failed to serialize report document: {0}")]
    ReportSerialize(#[from] serde_json::Error),
}

impl RelayError {
    /// True for lock contention — another chain already owns the resource.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RelayError::Lock(LockError::Exists { .. }))
    }

    /// True for the distinct not-found outcomes (missing source, gone message).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RelayError::SourceNotFound { .. }
                | RelayError::Storage(StorageError::NotFound { .. })
                | RelayError::Transport(TransportError::MessageGone { .. })
        )
    }
}
