use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors produced by the stream connections and their collaborators.
///
/// The enum is `Clone` so the error that terminated a read loop can be kept
/// on the connection and handed out again through `Conn::last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Reader busy: another reader is already consuming this connection")]
    ReaderBusy,

    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl StreamError {
    /// Socket level failure, including a failed pong write or a peer close.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::ConnectionClosed | Self::ConnectionTimeout(_)
        )
    }

    /// Malformed or schema-mismatched payload.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::DeserializationError(_))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializationError(err.to_string())
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::NetworkError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}
