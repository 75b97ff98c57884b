//! Error answers of the BuJo API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    #[default]
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// Both body shapes the API answers with: an explicit `{code, message}` and
/// the server framework's default `{status, error, message, path}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<ErrorCode>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Request path echoed back by the server, when it sends one.
    pub path: Option<String>,
}

impl ApiError {
    /// Interprets a non-2xx answer. Structured bodies win; a plain-text body
    /// becomes the message; an empty one falls back to the status line.
    pub fn from_response(status: u16, body: &str) -> Self {
        let raw = body.trim();
        let parsed = serde_json::from_str::<ErrorBody>(raw).ok();
        let ErrorBody {
            code,
            status: body_status,
            error,
            message,
            path,
        } = parsed.unwrap_or_default();

        let code = code.unwrap_or_else(|| ErrorCode::from_status(body_status.unwrap_or(status)));
        let message = [message, error]
            .into_iter()
            .flatten()
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
            .or_else(|| {
                (!raw.is_empty() && !raw.starts_with('{')).then(|| raw.to_string())
            })
            .unwrap_or_else(|| format!("http status {status}"));

        Self {
            code,
            message,
            path,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self.code, ErrorCode::Unauthorized | ErrorCode::Forbidden)
    }
}
