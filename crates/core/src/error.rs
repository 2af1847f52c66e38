use thiserror::Error;

/// Crate-wide error kinds, shared by the broker, both orchestrators, the session store
/// and the health registry. Library crates may additionally define a narrower,
/// crate-local error enum for implementation-specific failure modes and convert into
/// this type at the orchestration boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-visible, 400-class: malformed input that must not be retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The backend (Redis, or an HTTP collaborator) is unreachable, or its circuit is open.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An upstream HTTP collaborator (embedding, vector store, LLM) returned a non-success result.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// TTL elapsed before the Message could be dispatched.
    #[error("message expired")]
    Expired,

    /// Retry budget consumed; the Message has been moved to the dead-letter queue.
    #[error("max attempts exceeded")]
    MaxAttemptsExceeded,

    /// A registered handler panicked during dispatch.
    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    /// The Broker is in the `stopping` or `stopped` state and rejects new work.
    #[error("broker is shutting down")]
    ShuttingDown,

    /// A session or job id had no matching record.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("redis error: {0}")]
    Redis(String),
}

impl Error {
    /// Whether the broker's retry policy should re-attempt a dispatch that failed with
    /// this error, as opposed to surfacing it unchanged (e.g. `InvalidInput`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::UpstreamFailure(_) | Error::HandlerPanic(_)
        )
    }
}
