use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("unsupported source host: {0}")]
    UnsupportedHost(String),

    #[error("could not parse repository URL: {0}")]
    InvalidUrl(String),

    #[error("source provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("source provider returned an unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type Result<T, E = ScmError> = std::result::Result<T, E>;
