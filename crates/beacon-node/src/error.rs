//! Error types for the node daemon.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can stop a node from starting or running.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bearer error
    #[error("Transport error: {0}")]
    Transport(#[from] beacon_transfer::TransportError),

    /// Commissioning database error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
