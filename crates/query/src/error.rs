use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Client(#[from] pdfchat_clients::ClientError),

    #[error(transparent)]
    Session(#[from] pdfchat_session::SessionError),

    #[error(transparent)]
    Core(#[from] pdfchat_core::Error),
}

impl From<QueryError> for pdfchat_core::Error {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Core(inner) => inner,
            other => pdfchat_core::Error::UpstreamFailure(other.to_string()),
        }
    }
}
