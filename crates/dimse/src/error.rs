//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Network initialization failed: {0}")]
    NetworkInit(String),

    #[error("DICOM object error: {0}")]
    DicomObject(String),

    #[error("Association rejected: {0}")]
    AssociationRejected(String),

    #[error("No usable presentation context: {0}")]
    NoUsableContext(String),

    #[error("DIMSE operation failed: {0}")]
    OperationFailed(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid AE Title: {0}")]
    InvalidAeTitle(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new network initialization error
    pub fn network_init(msg: impl Into<String>) -> Self {
        Self::NetworkInit(msg.into())
    }

    /// Create a new operation failed error
    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }
}
