use thiserror::Error;

use crate::auth::AuthError;

/// Top-level errors surfaced by CLI commands and server startup.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("{0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;
