//! Async client for the brick daemon protocol.
//!
//! A brick daemon multiplexes any number of sensor bricklets behind a single
//! TCP endpoint (default port 4223). This crate speaks the daemon's framed
//! wire protocol: request/response calls correlated by sequence number, plus
//! unsolicited enumeration callbacks announcing attached units.
//!
//! # Usage
//!
//! ```ignore
//! let (bus, mut events) = BusClient::connect("localhost", 4223).await?;
//! bus.enumerate().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let BusEvent::Enumerate(unit) = event {
//!         println!("{} announced (id {})", unit.uid, unit.device_identifier);
//!     }
//! }
//! ```
//!
//! Once the initial connection is established the client keeps the link alive
//! on its own: a dropped connection is re-dialed every second until it comes
//! back, and a [`BusEvent::Connected`] event with
//! [`ConnectReason::AutoReconnect`] is emitted so the consumer can request a
//! fresh enumeration. Requests issued while the link is down fail with
//! [`BusError::NotConnected`].

pub mod base58;
pub mod connection;
pub mod devices;
pub mod error;
pub mod frame;

pub use connection::{BusClient, BusEvent, ConnectReason};
pub use devices::{
    AirQuality, AirQualityValues, AmbientLightV3, BarometerV2, MotionDetectorV2,
};
pub use error::{BusError, Result};
pub use frame::{EnumerateEvent, EnumerationType};
