use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session not found: {0}")]
    NotFound(String),
}

impl From<SessionError> for pdfchat_core::Error {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => pdfchat_core::Error::NotFound(id),
            other => pdfchat_core::Error::BackendUnavailable(other.to_string()),
        }
    }
}
