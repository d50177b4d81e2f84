//! Error types for the risk engine
//!
//! Estimators never surface these to callers; they are produced by the store
//! layer and by construction-time operations (config, store open, log parsing).

use thiserror::Error;

/// Errors that can occur while reading or configuring the engine
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
