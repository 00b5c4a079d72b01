use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Failures surfaced by the board client. Cloneable so the same failure can
/// be returned, broadcast and kept as the board's last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("server rejected request: {}", .0.message)]
    Api(#[from] ApiError),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not decode server response: {0}")]
    Decode(String),
    #[error("board write queue is closed")]
    QueueClosed,
}

impl BoardError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            BoardError::Api(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(ErrorCode::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == Some(ErrorCode::Conflict)
    }
}

impl From<reqwest::Error> for BoardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BoardError::Decode(err.to_string())
        } else {
            BoardError::Transport(err.to_string())
        }
    }
}
