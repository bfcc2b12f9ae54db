//! Error types for the CDP client layer.

use thiserror::Error;

/// Errors raised while talking to Chrome over the DevTools protocol.
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Chrome not available: {0}")]
    ChromeNotAvailable(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("CDP protocol error {code}: {message}")]
    Protocol { code: i64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("JavaScript exception: {0}")]
    JavaScript(String),

    #[error("Response channel closed")]
    ChannelClosed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::ConnectionFailed(err.to_string())
    }
}

impl From<reqwest::Error> for CdpError {
    fn from(err: reqwest::Error) -> Self {
        CdpError::ChromeNotAvailable(err.to_string())
    }
}

impl From<url::ParseError> for CdpError {
    fn from(err: url::ParseError) -> Self {
        CdpError::InvalidUrl(err.to_string())
    }
}
