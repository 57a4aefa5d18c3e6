//! Error types for chatvoice

use thiserror::Error;

/// Result type alias for chatvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the voice and credential flows
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity store error
    #[error("identity store error: {0}")]
    Identity(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
