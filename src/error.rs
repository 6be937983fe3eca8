//! Error types for the relay daemon.

use thiserror::Error;

/// Main error type for relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Payload decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Payload decompress error: {0}")]
    Decompress(String),

    #[error("No converter reachable out of: {0}")]
    ConvertersUnreachable(String),

    #[error("Converter rejected manifest: {0}")]
    ConverterRejected(String),

    #[error("Bad converter response: {0}")]
    ConverterResponse(String),

    #[error("Worker {name} failed: {reason}")]
    Worker { name: String, reason: String },

    #[error("Invalid publish URL: {0}")]
    PublishUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<toml::de::Error> for RelayError {
    fn from(e: toml::de::Error) -> Self {
        RelayError::Config(e.to_string())
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
