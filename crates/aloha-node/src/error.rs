//! Error types for the Aloha node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected by the ledger
    #[error(transparent)]
    Ledger(#[from] aloha_ledger::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// The ledger task is gone
    #[error("Ledger service stopped")]
    ServiceStopped,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
