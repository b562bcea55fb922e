//! Zenoh bridge for brick-daemon sensor peripherals.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use zenoh_bridge_brick::bridge;
use zenoh_bridge_brick::config::BridgeConfig;

/// Zenoh bridge for brick-daemon sensor peripherals.
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-brick")]
#[command(about = "Samples brick-daemon peripherals and publishes readings to Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "brick.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // A malformed connection string fails here, before either transport is
    // touched.
    let config = BridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    zenoh_bridge_brick::init_tracing(&level)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {e}"))?;

    info!("Starting zenoh-bridge-brick");
    info!("Loaded configuration from {:?}", args.config);

    bridge::run(config).await?;

    Ok(())
}
