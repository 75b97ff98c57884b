use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiCallError {
    #[error("base url '{0}' cannot carry path segments")]
    InvalidBaseUrl(String),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {status}: {source}")]
    Status {
        status: u16,
        #[source]
        source: ApiError,
    },
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiCallError {
    /// Builds the error for a non-2xx answer from its status and body.
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            source: ApiError::from_response(status, body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}
