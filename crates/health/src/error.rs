use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealthError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<HealthError> for pdfchat_core::Error {
    fn from(e: HealthError) -> Self {
        pdfchat_core::Error::BackendUnavailable(e.to_string())
    }
}
