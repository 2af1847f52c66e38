use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] pdfchat_core::Error),
}

impl From<BrokerError> for pdfchat_core::Error {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Core(inner) => inner,
            other => pdfchat_core::Error::BackendUnavailable(other.to_string()),
        }
    }
}
