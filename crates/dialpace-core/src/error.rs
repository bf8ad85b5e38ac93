//! Unified error types for dialpace

use thiserror::Error;

/// Unified error type for all dialpace operations
#[derive(Error, Debug)]
pub enum DialpaceError {
    // Webhook errors
    #[error("Invalid webhook event: {0}")]
    InvalidEvent(String),

    // Provider errors
    #[error("Call placement failed: {0}")]
    Placement(String),

    // Scheduling errors
    #[error("Daily cap store error: {0}")]
    CapStore(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    // Metrics errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using DialpaceError
pub type Result<T> = std::result::Result<T, DialpaceError>;
