//! Zenoh bridge for brick-daemon sensor peripherals.
//!
//! This bridge discovers bricklets attached to a local brick daemon, samples
//! them on a fixed period, and publishes one aggregated reading per tick to
//! Zenoh. Sampling can be paused and resumed remotely, and desired-state
//! updates and generic messages are received on the device's administrative
//! key space.
//!
//! # Key Expressions
//!
//! ```text
//! <prefix>/<device-id>/telemetry
//! <prefix>/<device-id>/@/...
//! ```
//!
//! Where `<prefix>` comes from configuration (default `brick`) and
//! `<device-id>` from the device connection string.

pub mod assembler;
pub mod bridge;
pub mod cloud;
pub mod config;
pub mod discovery;
pub mod error;
pub mod registry;
pub mod retry;
pub mod state;

use error::BridgeError;

/// Initialize tracing with the given level, honoring `RUST_LOG` when set.
pub fn init_tracing(level: &str) -> error::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("Failed to initialize tracing: {e}")))
}
