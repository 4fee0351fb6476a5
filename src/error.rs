//! Error types and result aliases for the Galileo client.
//!
//! This module defines the core error type [`GalileoError`] and the [`Result`] type alias
//! used throughout the crate. Tree-building mistakes (`InvalidState`, `ValidationError`)
//! always reach the caller; sink failures are only surfaced from `flush` when the logger
//! is configured to propagate them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalileoError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Corrupted trace tree: {0}")]
    CorruptedTree(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl GalileoError {
    /// Whether this error came from the ingestion side rather than from tree building.
    pub fn is_sink_error(&self) -> bool {
        matches!(
            self,
            GalileoError::AuthError(_)
                | GalileoError::NotFound(_)
                | GalileoError::ApiError(_)
                | GalileoError::HttpError(_)
                | GalileoError::SerializationError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GalileoError>;
