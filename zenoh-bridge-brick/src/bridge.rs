//! The telemetry loop.
//!
//! Startup order matters: the bus connection and the first enumeration are
//! blocking (with unbounded fixed-backoff retry) so that units present at
//! startup are registered before the first tick; only then is the broker
//! link opened, the standby state reported, and the periodic cycle entered.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use brickbus::BusClient;
use tokio::signal;
use tracing::{debug, error, info};

use crate::assembler;
use crate::cloud::CloudLink;
use crate::config::{BridgeConfig, DeviceIdentity};
use crate::discovery;
use crate::error::{BridgeError, Result};
use crate::registry::DeviceRegistry;
use crate::retry::RetryPolicy;
use crate::state::BridgeState;

/// Backoff for bus connect and enumerate retries.
const BUS_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Run the bridge until interrupted or the broker session dies.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let identity = DeviceIdentity::parse(&config.cloud.connection_string)?;

    let state = Arc::new(BridgeState::new());
    let registry = Arc::new(DeviceRegistry::new());
    let retry = RetryPolicy::fixed(BUS_RETRY_BACKOFF);

    info!(
        host = %config.bus.host,
        port = config.bus.port,
        "connecting to brick daemon"
    );
    let (bus, events) = retry
        .run("bus connect", || {
            BusClient::connect(&config.bus.host, config.bus.port)
        })
        .await;
    info!("connected to brick daemon");

    // Blocking, so startup-present units are announced before the first tick.
    retry.run("initial enumeration", || bus.enumerate()).await;

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(discovery::run(
        events,
        registry.clone(),
        bus.clone(),
    )));

    let cloud = CloudLink::connect(&config.zenoh, &config.cloud, identity, state.clone()).await?;
    cloud.report_initial_state().await;
    tasks.extend(cloud.spawn_inbound());
    cloud.publish_status("running").await;

    let period = Duration::from_secs(config.cloud.interval_secs);
    let mut message_count: u64 = 0;

    info!(
        interval_secs = config.cloud.interval_secs,
        "bridge running"
    );

    let mut shutdown = pin!(signal::ctrl_c());
    let exit: Result<()> = loop {
        tokio::select! {
            result = &mut shutdown => {
                match result {
                    Ok(()) => info!("received shutdown signal"),
                    Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
                }
                break Ok(());
            }
            _ = tokio::time::sleep(period) => {}
        }

        if cloud.is_closed() {
            error!("broker session closed unexpectedly");
            break Err(BridgeError::Broker("session closed".to_string()));
        }

        // The tick is assembled regardless; the switch only gates the
        // publish, so re-enabling takes effect at the next boundary.
        let reading = assembler::assemble(&registry).await;
        if state.sampling_enabled() {
            debug!(message_count, bound = registry.len(), "publishing reading");
            cloud.publish(&reading, message_count);
            message_count += 1;
        } else {
            debug!("sampling disabled, reading not published");
        }
    };

    for task in &tasks {
        task.abort();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    match state.last_sent() {
        Some(at) => info!(last_sent = %at.to_rfc3339(), "last confirmed publish"),
        None => info!("no publish was confirmed"),
    }
    if let Some(at) = state.last_received() {
        info!(last_received = %at.to_rfc3339(), "last inbound message");
    }
    info!(counters = ?state.counters.snapshot(), "final counters");

    cloud.publish_status("offline").await;
    cloud.close().await;

    info!("bridge stopped");
    exit
}
