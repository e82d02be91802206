//! Error type shared by the endpoint, the storage layer and the shell.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EchoError {
    /// Provider credentials are absent from the environment
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// Non-success response from the completion provider or the chat endpoint
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed or failed response stream
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Shell action not allowed from the current screen
    #[error("Cannot {action} from the {screen} screen")]
    InvalidTransition {
        action: &'static str,
        screen: &'static str,
    },

    #[error("A reply is still in progress")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Journal entry {0} not found")]
    EntryNotFound(i64),
}

impl From<rusqlite::Error> for EchoError {
    fn from(err: rusqlite::Error) -> Self {
        EchoError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EchoError>;
