//! Error types for wirestage.

use thiserror::Error;

/// Main error type for all wirestage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while reading a capture stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading listener configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport could not be bound to its interface.
    #[error("Failed opening interface {interface}: {reason}")]
    Open {
        /// Interface (or capture path) that was being bound.
        interface: String,
        /// Why binding failed.
        reason: String,
    },

    /// `open` was called on a transport that is already bound.
    #[error("Transport {0} is already open")]
    AlreadyOpen(String),

    /// `read` or `write` was called before `open`.
    #[error("Transport {0} is not open")]
    NotOpen(String),

    /// Invalid capture filter expression.
    #[error("Invalid capture filter: {0}")]
    Filter(String),

    /// Invalid or truncated frame.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Link-layer header could not be stripped.
    #[error("Link layer error: {0}")]
    LinkLayer(String),

    /// Invalid capture stream (bad pcap magic, absurd record length, ...).
    #[error("Capture error: {0}")]
    Capture(String),

    /// Configuration error (missing mandatory stage, invalid setting).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dictionary or attribute resolution failed.
    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// A reply could not be encoded into a frame.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The listener command channel has no free slot.
    #[error("Listener command channel is full")]
    Backpressure,

    /// The listener task is gone.
    #[error("Listener closed")]
    ListenerClosed,
}

/// Result type alias using wirestage's Error.
pub type Result<T> = std::result::Result<T, Error>;
