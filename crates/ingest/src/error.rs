use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Client(#[from] pdfchat_clients::ClientError),

    #[error(transparent)]
    Core(#[from] pdfchat_core::Error),

    #[error("invalid chunk configuration: {0}")]
    InvalidConfig(String),
}

impl From<IngestError> for pdfchat_core::Error {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Core(inner) => inner,
            IngestError::InvalidConfig(msg) => pdfchat_core::Error::InvalidInput(msg),
            other => pdfchat_core::Error::UpstreamFailure(other.to_string()),
        }
    }
}
