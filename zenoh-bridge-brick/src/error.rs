//! Error types for the brick bridge.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that abort the bridge.
///
/// Transient conditions (bus reconnects, failed publishes, unreadable
/// peripherals) are handled in place and never reach this type.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration loading or validation failure.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// Broker connection or protocol failure.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Bus transport failure.
    #[error("Bus error: {0}")]
    Bus(#[from] brickbus::BusError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
