//! End-to-end tests of the discovery and sampling pipeline against a fake
//! brick daemon listening on loopback.
//!
//! The fake daemon answers the enumerate broadcast with a canned burst of
//! unit announcements and serves getter requests for the announced units, so
//! the real client, discovery task, registry and assembler are exercised
//! without hardware.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use brickbus::frame::{
    CALLBACK_ENUMERATE, EnumerateEvent, FUNCTION_ENUMERATE, FrameHeader, HEADER_LEN, encode_frame,
};
use brickbus::{BarometerV2, BusClient, MotionDetectorV2, base58};
use zenoh_bridge_brick::assembler;
use zenoh_bridge_brick::discovery;
use zenoh_bridge_brick::registry::{DeviceRegistry, PeripheralKind};

const MOTION_UID: &str = "abc";
const BARO_UID: &str = "xyz";
const BARO_UID_REPLACEMENT: &str = "xy2";

/// One canned unit announcement: uid, device identifier, enumeration type.
type Announcement = (&'static str, u16, u8);

fn enumerate_payload(uid: &str, device_identifier: u16, enumeration_type: u8) -> Vec<u8> {
    let mut payload = vec![0u8; EnumerateEvent::PAYLOAD_LEN];
    payload[..uid.len()].copy_from_slice(uid.as_bytes());
    payload[16] = b'a';
    payload[23..25].copy_from_slice(&device_identifier.to_le_bytes());
    payload[25] = enumeration_type;
    payload
}

/// Serve one client connection: announce `burst` on every enumerate request
/// and answer getters for the motion detector and barometer units.
async fn serve_connection(mut stream: TcpStream, burst: Vec<Announcement>) {
    let motion_uid = base58::decode_uid(MOTION_UID).unwrap();
    let baro_uid = base58::decode_uid(BARO_UID).unwrap();
    let baro_replacement_uid = base58::decode_uid(BARO_UID_REPLACEMENT).unwrap();

    let mut header_bytes = [0u8; HEADER_LEN];
    loop {
        if stream.read_exact(&mut header_bytes).await.is_err() {
            return;
        }
        let header = FrameHeader::parse(&header_bytes).unwrap();
        let mut payload = vec![0u8; header.payload_len()];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }

        if header.function_id == FUNCTION_ENUMERATE {
            for (uid, device_identifier, enumeration_type) in &burst {
                let callback = encode_frame(
                    0,
                    CALLBACK_ENUMERATE,
                    0,
                    false,
                    &enumerate_payload(uid, *device_identifier, *enumeration_type),
                );
                if stream.write_all(&callback).await.is_err() {
                    return;
                }
            }
            continue;
        }

        let response_payload: Vec<u8> = if header.uid == motion_uid {
            vec![1]
        } else if header.uid == baro_uid || header.uid == baro_replacement_uid {
            match header.function_id {
                BarometerV2::FUNCTION_GET_TEMPERATURE => 2350i32.to_le_bytes().to_vec(),
                BarometerV2::FUNCTION_GET_AIR_PRESSURE => 1_013_250i32.to_le_bytes().to_vec(),
                BarometerV2::FUNCTION_GET_ALTITUDE => 120_000i32.to_le_bytes().to_vec(),
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let response = encode_frame(
            header.uid,
            header.function_id,
            header.sequence,
            false,
            &response_payload,
        );
        if stream.write_all(&response).await.is_err() {
            return;
        }
    }
}

async fn start_fake_daemon(burst: Vec<Announcement>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve_connection(stream, burst.clone()));
        }
    });

    addr
}

async fn wait_for(registry: &DeviceRegistry, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.len() < expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "discovery timed out with {} of {} kinds bound",
            registry.len(),
            expected
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_discovers_and_assembles_with_partial_presence() {
    // A burst mixing a unit with an undecodable uid, an unsupported device
    // identifier, and two good units. The two failures must not affect the
    // classification of the units after them.
    let addr = start_fake_daemon(vec![
        ("0", brickbus::AmbientLightV3::DEVICE_IDENTIFIER, 0),
        ("zz", 9999, 0),
        (MOTION_UID, MotionDetectorV2::DEVICE_IDENTIFIER, 0),
        (BARO_UID, BarometerV2::DEVICE_IDENTIFIER, 0),
    ])
    .await;

    let (bus, events) = BusClient::connect(&addr.ip().to_string(), addr.port())
        .await
        .unwrap();
    bus.enumerate().await.unwrap();

    let registry = Arc::new(DeviceRegistry::new());
    tokio::spawn(discovery::run(events, registry.clone(), bus.clone()));

    wait_for(&registry, 2).await;

    let mut kinds = registry.kinds();
    kinds.sort_by_key(|k| k.as_str());
    assert_eq!(
        kinds,
        vec![PeripheralKind::Barometer, PeripheralKind::MotionDetector]
    );

    let reading = assembler::assemble(&registry).await;

    // Live values from the two bound units...
    assert_eq!(reading.payload.baro_temperature, 23.5);
    assert_eq!(reading.payload.baro_airpressure, 1013.25);
    assert_eq!(reading.payload.baro_altitude, 120.0);
    assert!(reading.payload.motion_detector);

    // ...and sentinels for everything that is not there.
    assert_eq!(reading.payload.aq_iaq_index, 0);
    assert_eq!(reading.payload.aq_iaq_accuracy, 0);
    assert_eq!(reading.payload.aq_temperature, 0.0);
    assert_eq!(reading.payload.aq_humidity, 0.0);
    assert_eq!(reading.payload.aq_air_pressure, 0.0);
    assert_eq!(reading.payload.al_illuminance, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reannouncement_replaces_single_entry() {
    // The barometer is announced twice with different addresses; the
    // disconnect announcement for the motion detector must be ignored.
    let addr = start_fake_daemon(vec![
        (BARO_UID, BarometerV2::DEVICE_IDENTIFIER, 0),
        (BARO_UID_REPLACEMENT, BarometerV2::DEVICE_IDENTIFIER, 1),
        (MOTION_UID, MotionDetectorV2::DEVICE_IDENTIFIER, 2),
    ])
    .await;

    let (bus, events) = BusClient::connect(&addr.ip().to_string(), addr.port())
        .await
        .unwrap();
    bus.enumerate().await.unwrap();

    let registry = Arc::new(DeviceRegistry::new());
    tokio::spawn(discovery::run(events, registry.clone(), bus.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.uid_of(PeripheralKind::Barometer).as_deref() != Some(BARO_UID_REPLACEMENT) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "replacement announcement was not applied"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Exactly one entry for the kind, carrying the most recent address.
    assert_eq!(registry.len(), 1);

    // A second identical burst must not create duplicates either.
    bus.enumerate().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.uid_of(PeripheralKind::Barometer).as_deref(),
        Some(BARO_UID_REPLACEMENT)
    );
    assert!(registry.motion_detector().is_none());
}
