//! Error types for the procurement query system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the procurement query system.
#[derive(Error, Debug)]
pub enum Error {
    /// A scalar aggregate was requested over an empty grouped set.
    #[error("Empty aggregate: {0}")]
    EmptyAggregate(String),

    /// Unknown catalog identifier.
    #[error("Query not found: {0}")]
    QueryNotFound(String),

    /// Data-access collaborator failure (storage, parse stage, limits).
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an empty aggregate error.
    pub fn empty_aggregate(msg: impl Into<String>) -> Self {
        Error::EmptyAggregate(msg.into())
    }

    /// Create a query-not-found error.
    pub fn query_not_found(id: impl Into<String>) -> Self {
        Error::QueryNotFound(id.into())
    }

    /// Create a data access error.
    pub fn data_access(msg: impl Into<String>) -> Self {
        Error::DataAccess(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error came from the data-access collaborator.
    pub fn is_data_access(&self) -> bool {
        matches!(self, Error::DataAccess(_))
    }
}
