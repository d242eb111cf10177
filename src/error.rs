//! Error types and handling.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fetching the records of a scope failed (network, authorization, store)
    #[error("Could not load attendance: {0}")]
    ScopeFetch(String),

    /// The batched status change was rejected or did not complete
    #[error("Bulk update failed: {0}")]
    BulkMutation(String),

    /// Local record store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel export error
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create a scope fetch error with message
    pub fn scope_fetch(msg: impl Into<String>) -> Self {
        Self::ScopeFetch(msg.into())
    }

    /// Create a bulk mutation error with message
    pub fn bulk_mutation(msg: impl Into<String>) -> Self {
        Self::BulkMutation(msg.into())
    }

    /// Create a store error with message
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a config error with message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export(err.to_string())
    }
}
