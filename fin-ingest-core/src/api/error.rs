//! Structured error types for API calls.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    /// Non-2xx response surfaced to the caller.
    #[error("HTTP {status}{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Status {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("response format changed: {0}")]
    Decode(String),

    #[error("session response carried no token")]
    MissingToken,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

/// Structured error body: `{"code": 13, "message": "..."}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
