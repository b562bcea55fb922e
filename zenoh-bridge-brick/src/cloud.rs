//! Upstream link to the zenoh broker.
//!
//! Owns the session and the device's key space:
//!
//! ```text
//! <prefix>/<device-id>/telemetry          outbound readings
//! <prefix>/<device-id>/@/status           bridge status documents
//! <prefix>/<device-id>/@/twin/reported    one-shot reported state
//! <prefix>/<device-id>/@/twin/desired     inbound desired-state updates
//! <prefix>/<device-id>/@/messages/**      inbound generic messages
//! <prefix>/<device-id>/@/method/*         remote method invocations
//! ```
//!
//! The `@` segment marks the administrative channel, keeping control traffic
//! out of the telemetry namespace.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zenoh::Session;

use crate::assembler::{Reading, SensorPayload};
use crate::config::{CloudConfig, DeviceIdentity, ZenohConfig};
use crate::error::{BridgeError, Result};
use crate::state::BridgeState;

/// Default broker port used when deriving an endpoint from the identity.
const DEFAULT_BROKER_PORT: u16 = 7447;

/// Outbound wire message. The field set is fixed; absent peripherals are
/// published as sentinels, never as missing keys.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMessage {
    #[serde(rename = "PayLoadTimeStamp")]
    pub timestamp: String,

    #[serde(rename = "ReverseTimeStamp")]
    pub reverse_timestamp: String,

    #[serde(rename = "Payload")]
    pub payload: SensorPayload,
}

impl TelemetryMessage {
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            timestamp: reading.captured_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            // The counter is an exact tick count; the fixed six-digit
            // fraction keeps the documented decimal shape.
            reverse_timestamp: format!("{}.000000", reading.reverse_timestamp),
            payload: reading.payload.clone(),
        }
    }
}

/// Outcome of a remote method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodOutcome {
    pub status: u16,
    pub response: &'static str,
}

/// Apply a remote method to the shared state.
///
/// Only `start` and `stop` carry behavior; every other name, known or not,
/// is acknowledged with a generic body. Unknown methods are not errors.
pub fn dispatch_method(name: &str, state: &BridgeState) -> MethodOutcome {
    state.counters.method_calls.fetch_add(1, Ordering::Relaxed);

    match name {
        "start" => {
            state.set_sampling(true);
            info!("sampling enabled by remote method");
            MethodOutcome {
                status: 200,
                response: "Successfully started",
            }
        }
        "stop" => {
            state.set_sampling(false);
            info!("sampling disabled by remote method");
            MethodOutcome {
                status: 200,
                response: "Successfully stopped",
            }
        }
        other => {
            debug!(method = other, "acknowledging unrecognized method");
            MethodOutcome {
                status: 200,
                response: "This is the response from the device",
            }
        }
    }
}

/// Managed connection to the broker.
pub struct CloudLink {
    session: Session,
    identity: DeviceIdentity,
    key_prefix: String,
    message_expiry: Duration,
    verbose_trace: bool,
    state: Arc<BridgeState>,
}

impl CloudLink {
    /// Open the broker session. The identity constructs the link: with no
    /// explicit endpoints in client mode, `HostName` becomes the endpoint.
    pub async fn connect(
        zenoh_config: &ZenohConfig,
        cloud_config: &CloudConfig,
        identity: DeviceIdentity,
        state: Arc<BridgeState>,
    ) -> Result<Self> {
        let mut config = zenoh::Config::default();

        config
            .insert_json5("mode", &format!("\"{}\"", zenoh_config.mode))
            .map_err(|e| BridgeError::Config(format!("Failed to set mode: {e}")))?;

        let mut endpoints = zenoh_config.connect.clone();
        if endpoints.is_empty() && zenoh_config.mode == "client" {
            endpoints.push(format!("tcp/{}:{}", identity.host, DEFAULT_BROKER_PORT));
        }

        if !endpoints.is_empty() {
            let endpoints_json = serde_json::to_string(&endpoints)?;
            config
                .insert_json5("connect/endpoints", &endpoints_json)
                .map_err(|e| BridgeError::Config(format!("Failed to set connect endpoints: {e}")))?;
        }

        if !zenoh_config.listen.is_empty() {
            let endpoints_json = serde_json::to_string(&zenoh_config.listen)?;
            config
                .insert_json5("listen/endpoints", &endpoints_json)
                .map_err(|e| BridgeError::Config(format!("Failed to set listen endpoints: {e}")))?;
        }

        info!(
            mode = %zenoh_config.mode,
            device = %identity.device_id,
            "connecting to broker"
        );

        let session = zenoh::open(config)
            .await
            .map_err(|e| BridgeError::Broker(e.to_string()))?;

        info!(zid = %session.zid(), "broker session established");

        Ok(Self {
            session,
            identity,
            key_prefix: cloud_config.key_prefix.clone(),
            message_expiry: Duration::from_millis(cloud_config.message_expiry_ms),
            verbose_trace: cloud_config.verbose_trace,
            state,
        })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.key_prefix, self.identity.device_id, suffix)
    }

    /// One-shot reported-state announcement made before the loop begins.
    /// Fire-and-forget; the confirmation is advisory.
    pub async fn report_initial_state(&self) {
        let key = self.key("@/twin/reported");
        let document = serde_json::json!({ "newState": "standBy" });

        match self.session.put(&key, document.to_string()).await {
            Ok(()) => info!("reported initial state"),
            Err(e) => warn!(error = %e, "failed to report initial state"),
        }
    }

    /// Publish a bridge status document to the administrative channel.
    pub async fn publish_status(&self, status: &str) {
        let key = self.key("@/status");
        let document = serde_json::json!({
            "bridge": "brick",
            "version": env!("CARGO_PKG_VERSION"),
            "device": self.identity.device_id,
            "status": status,
        });

        if let Err(e) = self.session.put(&key, document.to_string()).await {
            warn!(error = %e, "failed to publish bridge status");
        }
    }

    /// Submit one reading for publication.
    ///
    /// Submission returns immediately; the confirmation (bounded by the
    /// message expiry) arrives on a spawned task and is only logged,
    /// correlated by the sequence tag. A failed reading is never re-sent;
    /// the next tick supersedes it.
    pub fn publish(&self, reading: &Reading, sequence: u64) {
        let message = TelemetryMessage::from_reading(reading);
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(sequence, error = %e, "failed to serialize reading");
                return;
            }
        };

        if self.verbose_trace {
            debug!(
                sequence,
                payload = %String::from_utf8_lossy(&payload),
                "submitting reading"
            );
        }

        let session = self.session.clone();
        let key = self.key("telemetry");
        let state = self.state.clone();
        let expiry = self.message_expiry;

        tokio::spawn(async move {
            match tokio::time::timeout(expiry, session.put(&key, payload)).await {
                Ok(Ok(())) => {
                    let sent = state.counters.sent.fetch_add(1, Ordering::Relaxed) + 1;
                    state.record_sent(Utc::now());
                    debug!(sequence, sent, "publish confirmed");
                }
                Ok(Err(e)) => warn!(sequence, error = %e, "publish failed, reading dropped"),
                Err(_) => warn!(sequence, "publish confirmation expired, reading dropped"),
            }
        });
    }

    /// Spawn the three inbound channels: generic messages, desired-state
    /// updates, and the remote method responder. Each runs concurrently with
    /// the sampling loop until aborted.
    pub fn spawn_inbound(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(message_task(
                self.session.clone(),
                self.key("@/messages/**"),
                self.state.clone(),
            )),
            tokio::spawn(twin_task(
                self.session.clone(),
                self.key("@/twin/desired"),
                self.state.clone(),
            )),
            tokio::spawn(method_task(
                self.session.clone(),
                self.key("@/method/*"),
                self.state.clone(),
            )),
        ]
    }

    /// Whether the broker session has died underneath us.
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub async fn close(self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "error closing broker session");
        }
    }
}

/// Log and count generic inbound messages. Disposition is always "accepted".
async fn message_task(session: Session, key_expr: String, state: Arc<BridgeState>) {
    let subscriber = match session.declare_subscriber(&key_expr).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!(key = %key_expr, error = %e, "failed to subscribe for inbound messages");
            return;
        }
    };

    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        let total = state.counters.received.fetch_add(1, Ordering::Relaxed) + 1;
        state.record_received(Utc::now());

        info!(
            key = %sample.key_expr(),
            size = payload.len(),
            data = %String::from_utf8_lossy(&payload),
            total,
            "inbound message accepted"
        );
    }
}

/// Log and count desired-state updates. Not otherwise acted upon.
async fn twin_task(session: Session, key_expr: String, state: Arc<BridgeState>) {
    let subscriber = match session.declare_subscriber(&key_expr).await {
        Ok(subscriber) => subscriber,
        Err(e) => {
            error!(key = %key_expr, error = %e, "failed to subscribe for desired state");
            return;
        }
    };

    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        let total = state.counters.twin_updates.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            payload = %String::from_utf8_lossy(&payload),
            total,
            "desired state update"
        );
    }
}

/// Serve remote method invocations, replying synchronously with a status and
/// response body.
async fn method_task(session: Session, key_expr: String, state: Arc<BridgeState>) {
    let queryable = match session.declare_queryable(&key_expr).await {
        Ok(queryable) => queryable,
        Err(e) => {
            error!(key = %key_expr, error = %e, "failed to declare method responder");
            return;
        }
    };

    while let Ok(query) = queryable.recv_async().await {
        let method = query
            .key_expr()
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let payload = query
            .payload()
            .map(|p| String::from_utf8_lossy(&p.to_bytes()).into_owned())
            .unwrap_or_default();

        info!(method = %method, payload = %payload, "remote method invoked");

        let outcome = dispatch_method(&method, &state);
        let reply = serde_json::json!({
            "Status": outcome.status,
            "Response": outcome.response,
        });

        if let Err(e) = query
            .reply(query.key_expr().clone(), reply.to_string())
            .await
        {
            warn!(method = %method, error = %e, "failed to reply to remote method");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::reverse_timestamp;
    use chrono::TimeZone;

    fn reading_at(at: chrono::DateTime<Utc>) -> Reading {
        Reading {
            captured_at: at,
            reverse_timestamp: reverse_timestamp(at),
            payload: SensorPayload::default(),
        }
    }

    #[test]
    fn test_wire_message_has_exactly_the_fixed_keys() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let message = TelemetryMessage::from_reading(&reading_at(at));
        let value = serde_json::to_value(&message).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("PayLoadTimeStamp"));
        assert!(object.contains_key("ReverseTimeStamp"));
        assert!(object.contains_key("Payload"));

        let payload = object["Payload"].as_object().unwrap();
        let expected = [
            "baro_temperature",
            "baro_airpressure",
            "baro_altitude",
            "aq_iaq_index",
            "aq_iaq_accuracy",
            "aq_temperature",
            "aq_humidity",
            "aq_air_pressure",
            "al_illuminance",
            "motion_detector",
        ];
        assert_eq!(payload.len(), expected.len());
        for key in expected {
            assert!(payload.contains_key(key), "missing payload key {key}");
        }
    }

    #[test]
    fn test_wire_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
        let message = TelemetryMessage::from_reading(&reading_at(at));

        assert_eq!(message.timestamp, "2024-05-01T12:30:45Z");
        assert!(message.reverse_timestamp.ends_with(".000000"));
    }

    #[test]
    fn test_wire_reverse_timestamp_orders_lexicographically() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::seconds(60);

        let m1 = TelemetryMessage::from_reading(&reading_at(t1));
        let m2 = TelemetryMessage::from_reading(&reading_at(t2));

        // Same digit count for contemporary dates, so string order matches
        // numeric order and later captures sort first.
        assert_eq!(m1.reverse_timestamp.len(), m2.reverse_timestamp.len());
        assert!(m1.reverse_timestamp > m2.reverse_timestamp);
    }

    #[test]
    fn test_dispatch_start_and_stop() {
        let state = BridgeState::new();

        let stopped = dispatch_method("stop", &state);
        assert_eq!(stopped.status, 200);
        assert_eq!(stopped.response, "Successfully stopped");
        assert!(!state.sampling_enabled());

        let started = dispatch_method("start", &state);
        assert_eq!(started.status, 200);
        assert_eq!(started.response, "Successfully started");
        assert!(state.sampling_enabled());
    }

    #[test]
    fn test_dispatch_unknown_method_still_succeeds() {
        let state = BridgeState::new();
        let outcome = dispatch_method("reboot", &state);

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.response, "This is the response from the device");
        // The switch is untouched.
        assert!(state.sampling_enabled());
    }

    #[test]
    fn test_dispatch_counts_every_invocation() {
        let state = BridgeState::new();
        dispatch_method("stop", &state);
        dispatch_method("start", &state);
        dispatch_method("whatever", &state);

        assert_eq!(state.counters.snapshot().method_calls, 3);
    }

    #[test]
    fn test_method_reply_shape() {
        let state = BridgeState::new();
        let outcome = dispatch_method("start", &state);
        let reply = serde_json::json!({
            "Status": outcome.status,
            "Response": outcome.response,
        });

        assert_eq!(
            reply.to_string(),
            r#"{"Response":"Successfully started","Status":200}"#
        );
    }
}
