//! Registry of bound peripherals.

use std::collections::HashMap;

use brickbus::{AirQuality, AmbientLightV3, BarometerV2, BusClient, MotionDetectorV2};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// The peripheral kinds this bridge samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralKind {
    AmbientLight,
    Barometer,
    AirQuality,
    MotionDetector,
}

impl PeripheralKind {
    /// Classify an announced device identifier. Unknown identifiers return
    /// `None` and are left to other tooling.
    pub fn classify(device_identifier: u16) -> Option<Self> {
        match device_identifier {
            AmbientLightV3::DEVICE_IDENTIFIER => Some(Self::AmbientLight),
            BarometerV2::DEVICE_IDENTIFIER => Some(Self::Barometer),
            AirQuality::DEVICE_IDENTIFIER => Some(Self::AirQuality),
            MotionDetectorV2::DEVICE_IDENTIFIER => Some(Self::MotionDetector),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmbientLight => "ambient_light",
            Self::Barometer => "barometer",
            Self::AirQuality => "air_quality",
            Self::MotionDetector => "motion_detector",
        }
    }
}

impl std::fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bound device wrapper of one of the supported kinds.
#[derive(Debug, Clone)]
pub enum BoundDevice {
    AmbientLight(AmbientLightV3),
    Barometer(BarometerV2),
    AirQuality(AirQuality),
    MotionDetector(MotionDetectorV2),
}

impl BoundDevice {
    pub fn kind(&self) -> PeripheralKind {
        match self {
            Self::AmbientLight(_) => PeripheralKind::AmbientLight,
            Self::Barometer(_) => PeripheralKind::Barometer,
            Self::AirQuality(_) => PeripheralKind::AirQuality,
            Self::MotionDetector(_) => PeripheralKind::MotionDetector,
        }
    }
}

/// One bound peripheral. Immutable after creation; a re-announcement of the
/// same bus address produces a fresh handle that replaces this one.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    pub uid: String,
    pub bound_at: DateTime<Utc>,
    pub device: BoundDevice,
}

impl PeripheralHandle {
    /// Bind a handle for a classified unit. Fails on an undecodable UID.
    pub fn bind(kind: PeripheralKind, uid: &str, bus: &BusClient) -> brickbus::Result<Self> {
        let device = match kind {
            PeripheralKind::AmbientLight => {
                BoundDevice::AmbientLight(AmbientLightV3::new(uid, bus)?)
            }
            PeripheralKind::Barometer => BoundDevice::Barometer(BarometerV2::new(uid, bus)?),
            PeripheralKind::AirQuality => BoundDevice::AirQuality(AirQuality::new(uid, bus)?),
            PeripheralKind::MotionDetector => {
                BoundDevice::MotionDetector(MotionDetectorV2::new(uid, bus)?)
            }
        };

        Ok(Self {
            uid: uid.to_string(),
            bound_at: Utc::now(),
            device,
        })
    }
}

/// Mapping from kind to at most one live handle.
///
/// Absence of a kind is an expected steady state (not yet discovered, or
/// unplugged); a later bind for a present kind overwrites it, last seen
/// wins. Written by the discovery task, read by the sampling loop; every
/// operation is a single map-entry swap under the lock.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: RwLock<HashMap<PeripheralKind, PeripheralHandle>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle, replacing any previous entry of the same kind.
    pub fn insert(&self, handle: PeripheralHandle) -> Option<PeripheralHandle> {
        self.inner.write().insert(handle.device.kind(), handle)
    }

    pub fn ambient_light(&self) -> Option<AmbientLightV3> {
        match &self.inner.read().get(&PeripheralKind::AmbientLight)?.device {
            BoundDevice::AmbientLight(device) => Some(device.clone()),
            _ => None,
        }
    }

    pub fn barometer(&self) -> Option<BarometerV2> {
        match &self.inner.read().get(&PeripheralKind::Barometer)?.device {
            BoundDevice::Barometer(device) => Some(device.clone()),
            _ => None,
        }
    }

    pub fn air_quality(&self) -> Option<AirQuality> {
        match &self.inner.read().get(&PeripheralKind::AirQuality)?.device {
            BoundDevice::AirQuality(device) => Some(device.clone()),
            _ => None,
        }
    }

    pub fn motion_detector(&self) -> Option<MotionDetectorV2> {
        match &self.inner.read().get(&PeripheralKind::MotionDetector)?.device {
            BoundDevice::MotionDetector(device) => Some(device.clone()),
            _ => None,
        }
    }

    /// UID of the live handle for a kind, if any.
    pub fn uid_of(&self, kind: PeripheralKind) -> Option<String> {
        Some(self.inner.read().get(&kind)?.uid.clone())
    }

    /// Kinds currently bound.
    pub fn kinds(&self) -> Vec<PeripheralKind> {
        self.inner.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
