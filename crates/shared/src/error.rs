use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Forbidden,
    SchemaMismatch,
    Conflict,
    Validation,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorCode::NotFound => 404,
            ErrorCode::Forbidden => 403,
            // A missing sheet is reported like a missing resource.
            ErrorCode::SchemaMismatch => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::Validation => 400,
            ErrorCode::Unavailable => 502,
            ErrorCode::Internal => 500,
        }
    }
}

/// Uniform error envelope: `{ "error": "...", "code": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    #[serde(default = "unknown_code")]
    pub code: ErrorCode,
    #[serde(rename = "error")]
    pub message: String,
}

fn unknown_code() -> ErrorCode {
    ErrorCode::Internal
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}
