//! Error types for segwal
//!
//! Provides a unified error type for all log operations.

use thiserror::Error;

/// Result type alias using WalError
pub type Result<T> = std::result::Result<T, WalError>;

/// Unified error type for segwal operations
#[derive(Debug, Error)]
pub enum WalError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Decode Errors
    // -------------------------------------------------------------------------
    /// A record's length prefix or payload could not be fully read.
    ///
    /// During recovery this marks the end of a segment's valid content.
    #[error("Unexpected end of record")]
    UnexpectedEof,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid segment file name: {0}")]
    InvalidSegmentName(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index {index} out of range (first={first}, last={last})")]
    OutOfRange { index: u64, first: u64, last: u64 },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("WAL is closed")]
    Closed,
}
