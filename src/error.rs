//! Error types for streamprint
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in streamprint
#[derive(Debug, Error)]
pub enum StreamPrintError {
    /// The surrounding context was cancelled or its deadline passed
    #[error("Operation cancelled")]
    Cancelled,

    /// The transaction can no longer serve reads and must be replaced
    #[error("Transaction too old")]
    TransactionTooOld,

    /// Another transaction committed a conflicting write first
    #[error("Commit conflict on key: {0}")]
    CommitConflict(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Record could not be built from its input
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Unknown output format name
    #[error("Invalid output format: {0}")]
    InvalidFormat(String),

    /// Configuration values that cannot work together
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Hard error raised while pulling the next record
    #[error("Couldn't get next record: {0}")]
    Pull(#[source] Box<StreamPrintError>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for streamprint operations
pub type Result<T> = std::result::Result<T, StreamPrintError>;
