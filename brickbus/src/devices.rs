//! Typed wrappers for the supported bricklet kinds.
//!
//! Every wrapper holds the decoded 32-bit UID and a clone of the client
//! handle; constructing one fails only on an undecodable UID. All getters
//! return the raw fixed-point integers the hardware reports; unit scaling is
//! the caller's concern.

use crate::base58;
use crate::connection::BusClient;
use crate::error::{BusError, Result};

/// Ambient light bricklet 3.0.
#[derive(Debug, Clone)]
pub struct AmbientLightV3 {
    uid: u32,
    bus: BusClient,
}

impl AmbientLightV3 {
    pub const DEVICE_IDENTIFIER: u16 = 2131;
    pub const FUNCTION_GET_ILLUMINANCE: u8 = 1;

    pub fn new(uid: &str, bus: &BusClient) -> Result<Self> {
        Ok(Self {
            uid: base58::decode_uid(uid)?,
            bus: bus.clone(),
        })
    }

    /// Illuminance in 1/100 lx.
    pub async fn illuminance(&self) -> Result<u32> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_ILLUMINANCE, &[])
            .await?;
        read_u32(&payload)
    }
}

/// Barometer bricklet 2.0.
#[derive(Debug, Clone)]
pub struct BarometerV2 {
    uid: u32,
    bus: BusClient,
}

impl BarometerV2 {
    pub const DEVICE_IDENTIFIER: u16 = 2117;
    pub const FUNCTION_GET_AIR_PRESSURE: u8 = 1;
    pub const FUNCTION_GET_ALTITUDE: u8 = 5;
    pub const FUNCTION_GET_TEMPERATURE: u8 = 8;

    pub fn new(uid: &str, bus: &BusClient) -> Result<Self> {
        Ok(Self {
            uid: base58::decode_uid(uid)?,
            bus: bus.clone(),
        })
    }

    /// Air pressure in 1/1000 hPa.
    pub async fn air_pressure(&self) -> Result<i32> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_AIR_PRESSURE, &[])
            .await?;
        read_i32(&payload)
    }

    /// Altitude in 1/1000 m.
    pub async fn altitude(&self) -> Result<i32> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_ALTITUDE, &[])
            .await?;
        read_i32(&payload)
    }

    /// Temperature in 1/100 °C.
    pub async fn temperature(&self) -> Result<i32> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_TEMPERATURE, &[])
            .await?;
        read_i32(&payload)
    }
}

/// All readings of the air quality bricklet, as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AirQualityValues {
    pub iaq_index: i32,
    pub iaq_index_accuracy: u8,
    /// 1/100 °C.
    pub temperature: i32,
    /// 1/100 %RH.
    pub humidity: i32,
    /// 1/100 hPa.
    pub air_pressure: i32,
}

/// Air quality bricklet.
#[derive(Debug, Clone)]
pub struct AirQuality {
    uid: u32,
    bus: BusClient,
}

impl AirQuality {
    pub const DEVICE_IDENTIFIER: u16 = 297;
    pub const FUNCTION_GET_ALL_VALUES: u8 = 1;

    pub fn new(uid: &str, bus: &BusClient) -> Result<Self> {
        Ok(Self {
            uid: base58::decode_uid(uid)?,
            bus: bus.clone(),
        })
    }

    pub async fn all_values(&self) -> Result<AirQualityValues> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_ALL_VALUES, &[])
            .await?;
        if payload.len() < 17 {
            return Err(short_payload(payload.len(), 17));
        }

        Ok(AirQualityValues {
            iaq_index: i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
            iaq_index_accuracy: payload[4],
            temperature: i32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]),
            humidity: i32::from_le_bytes([payload[9], payload[10], payload[11], payload[12]]),
            air_pressure: i32::from_le_bytes([payload[13], payload[14], payload[15], payload[16]]),
        })
    }
}

/// Motion detector bricklet 2.0.
#[derive(Debug, Clone)]
pub struct MotionDetectorV2 {
    uid: u32,
    bus: BusClient,
}

impl MotionDetectorV2 {
    pub const DEVICE_IDENTIFIER: u16 = 292;
    pub const FUNCTION_GET_MOTION_DETECTED: u8 = 1;

    pub fn new(uid: &str, bus: &BusClient) -> Result<Self> {
        Ok(Self {
            uid: base58::decode_uid(uid)?,
            bus: bus.clone(),
        })
    }

    pub async fn motion_detected(&self) -> Result<bool> {
        let payload = self
            .bus
            .request(self.uid, Self::FUNCTION_GET_MOTION_DETECTED, &[])
            .await?;
        match payload.first() {
            Some(&b) => Ok(b != 0),
            None => Err(short_payload(0, 1)),
        }
    }
}

fn read_i32(payload: &[u8]) -> Result<i32> {
    match payload.get(0..4) {
        Some(bytes) => Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(short_payload(payload.len(), 4)),
    }
}

fn read_u32(payload: &[u8]) -> Result<u32> {
    match payload.get(0..4) {
        Some(bytes) => Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(short_payload(payload.len(), 4)),
    }
}

fn short_payload(got: usize, want: usize) -> BusError {
    BusError::Frame(format!("response payload is {got} bytes, expected {want}"))
}
