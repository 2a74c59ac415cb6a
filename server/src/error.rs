//! Error types for the game server

use thiserror::Error;

/// Credential problems. Any of these refuses the connection outright.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication token missing")]
    MissingToken,

    #[error("invalid authentication token")]
    InvalidToken,

    #[error("failed to load token table: {0}")]
    TokenTable(String),
}

/// Failures from a user or cube store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode cube snapshot: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True when the stored bytes were read but could not be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Json(_) | StoreError::Snapshot(_))
    }
}

/// Errors surfaced to a caller as a transient failure.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("connection {0} is not registered")]
    UnknownConnection(u64),

    #[error("server full")]
    ServerFull,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
