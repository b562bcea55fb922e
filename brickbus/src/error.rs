use thiserror::Error;

/// Errors surfaced by the bus client.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected to the brick daemon")]
    NotConnected,

    #[error("request timed out")]
    Timeout,

    #[error("invalid UID '{0}'")]
    InvalidUid(String),

    #[error("device reported error code {0}")]
    Device(u8),

    #[error("malformed frame: {0}")]
    Frame(String),
}

/// Result type alias using [`BusError`].
pub type Result<T> = std::result::Result<T, BusError>;
