//! Error types for JDP

use thiserror::Error;

/// Result type alias for JDP operations
pub type Result<T> = std::result::Result<T, JdpError>;

/// Main error type for JDP
#[derive(Error, Debug)]
pub enum JdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
