//! Error types for the headless client

use shared::UnknownUpgrade;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid message from server: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("invalid authorization header: {0}")]
    Header(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("connection closed by server")]
    Closed,
}

/// Problems with a typed command line. Reported and otherwise ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown face '{0}'")]
    Face(String),

    #[error("'{0}' is not a cell index")]
    Index(String),

    #[error(transparent)]
    Upgrade(#[from] UnknownUpgrade),
}
