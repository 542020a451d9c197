//! Error types for vidmix.

use thiserror::Error;

/// Reasons a media file can fail to open.
///
/// Each cause stays distinguishable so the caller can report it.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Invalid media data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
}

/// Main error type for vidmix operations.
#[derive(Error, Debug)]
pub enum VidmixError {
    #[error("Cannot open media: {0}")]
    Open(#[from] OpenError),

    #[error("Decoder error: {0}")]
    Decode(String),

    #[error("Seek to {target:.3}s landed at {landed:.3}s")]
    SeekMiss { target: f64, landed: f64 },

    #[error("Decoding thread did not stop within {timeout_ms} ms")]
    CancellationTimeout { timeout_ms: u64 },

    #[error("No media is open")]
    NotOpen,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for vidmix operations.
pub type Result<T> = std::result::Result<T, VidmixError>;
