use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<ClientError> for pdfchat_core::Error {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::InvalidInput(msg) => pdfchat_core::Error::InvalidInput(msg),
            other => pdfchat_core::Error::UpstreamFailure(other.to_string()),
        }
    }
}
