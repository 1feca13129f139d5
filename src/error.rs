use std::time::Duration;

use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no active session")]
    Unauthenticated,

    #[error("invalid message: {0}")]
    InvalidContent(String),

    #[error("request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

impl ChatError {
    /// Status code of a rejected REST call, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Api { status, .. } => Some(*status),
            ChatError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
