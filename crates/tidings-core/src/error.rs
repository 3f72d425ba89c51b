//! Tidings error types.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, TidingsError>;

/// Top-level error for Tidings components.
#[derive(Debug, Error)]
pub enum TidingsError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Gathering error: {0}")]
    Gather(String),

    #[error("Payment error: {0}")]
    Payment(String),

    #[error("Chain RPC error: {0}")]
    Chain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
