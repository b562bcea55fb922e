//! Peripheral discovery.
//!
//! Consumes the bus event stream: unit announcements are classified and
//! bound into the registry, and a recovered connection triggers a fresh
//! enumeration (peripherals may have been re-addressed across the
//! reconnect).

use std::sync::Arc;
use std::time::Duration;

use brickbus::{BusClient, BusEvent, ConnectReason, EnumerateEvent, EnumerationType};
use tracing::{debug, error, info, trace};

use crate::registry::{DeviceRegistry, PeripheralHandle, PeripheralKind};
use crate::retry::RetryPolicy;

/// Backoff for the re-enumeration request after an auto-reconnect.
const ENUMERATE_BACKOFF: Duration = Duration::from_secs(1);

/// Run the discovery task until the event stream closes.
pub async fn run(
    mut events: tokio::sync::mpsc::Receiver<BusEvent>,
    registry: Arc<DeviceRegistry>,
    bus: BusClient,
) {
    let retry = RetryPolicy::fixed(ENUMERATE_BACKOFF);

    while let Some(event) = events.recv().await {
        match event {
            BusEvent::Enumerate(event) => handle_enumerate(&event, &registry, &bus),
            BusEvent::Connected(ConnectReason::AutoReconnect) => {
                // Without a fresh enumeration the registry would never see
                // the re-addressed units again, so this must not be skipped.
                info!("bus connection recovered, requesting re-enumeration");
                retry.run("re-enumeration", || bus.enumerate()).await;
            }
            BusEvent::Connected(ConnectReason::Request) => {}
        }
    }

    debug!("bus event stream closed, discovery stopped");
}

/// Handle a single unit announcement.
///
/// A failure here is contained to this unit: the announcement is dropped and
/// the rest of the burst classifies normally.
pub fn handle_enumerate(event: &EnumerateEvent, registry: &DeviceRegistry, bus: &BusClient) {
    match event.enumeration_type {
        EnumerationType::Available | EnumerationType::Connected => {}
        _ => return,
    }

    let Some(kind) = PeripheralKind::classify(event.device_identifier) else {
        trace!(
            uid = %event.uid,
            device_identifier = event.device_identifier,
            "ignoring unsupported unit"
        );
        return;
    };

    match PeripheralHandle::bind(kind, &event.uid, bus) {
        Ok(handle) => {
            let replaced = registry.insert(handle);
            match replaced {
                Some(previous) => info!(
                    kind = %kind,
                    uid = %event.uid,
                    previous_uid = %previous.uid,
                    "peripheral re-bound"
                ),
                None => info!(kind = %kind, uid = %event.uid, "peripheral bound"),
            }
        }
        Err(e) => error!(kind = %kind, uid = %event.uid, error = %e, "peripheral bind failed"),
    }
}
