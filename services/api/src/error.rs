//! services/api/src/error.rs
//!
//! Startup failures of the learning spaces service. Request-level failures
//! never reach this type; the gateway turns them into an `ActionResult`.

use crate::config::ConfigError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting the pool or talking to Postgres failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The local directory holding uploaded sources could not be prepared.
    #[error("Storage root {path:?} is unusable: {source}")]
    StorageRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CORS_ORIGIN '{origin}': {reason}")]
    Cors { origin: String, reason: String },

    /// Binding or serving the HTTP listener failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
