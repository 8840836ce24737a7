//! Error types for feed operations.

use bestquote_book::QuoteError;
use thiserror::Error;

/// Error decoding a venue frame into quote candidates.
///
/// Decode errors never reach the store: the frame is dropped and logged.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame is not valid JSON for the expected message.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Numeric field is not a decimal number.
    #[error("invalid {field}: {value:?}")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },

    /// Parsed values are non-finite or negative.
    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// Frame is for another instrument.
    #[error("symbol mismatch: expected {expected}, got {actual}")]
    SymbolMismatch {
        /// Subscribed symbol.
        expected: String,
        /// Symbol found in the frame.
        actual: String,
    },

    /// Frame carries an event type this decoder does not handle.
    #[error("unexpected event type {0:?}")]
    UnexpectedEvent(String),
}

impl DecodeError {
    /// Creates an invalid number error.
    pub fn invalid_number(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            field,
            value: value.into(),
        }
    }
}

/// Error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Connection could not be established.
    #[error("connect failed: {message}")]
    Connect {
        /// Error message.
        message: String,
    },

    /// Connection closed by the venue.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport failure on an established connection.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// Snapshot request failed.
    #[error("snapshot fetch failed: {message}")]
    Fetch {
        /// Error message.
        message: String,
    },

    /// Frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Maximum reconnect attempts reached.
    #[error("maximum reconnect attempts reached")]
    MaxReconnectAttempts,
}

impl FeedError {
    /// Creates a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }
}
