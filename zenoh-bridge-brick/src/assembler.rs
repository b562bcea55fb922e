//! Per-tick reading assembly.
//!
//! Each tick produces one [`Reading`] covering all ten metrics. A metric
//! group whose peripheral is absent, or whose query fails, keeps its default
//! sentinel for that tick. Values are never carried over from a previous
//! tick, so a gap shows up as zero/false rather than stale data.

use brickbus::AirQualityValues;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::registry::DeviceRegistry;

/// 100 ns ticks per second.
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch.
const YEAR_ONE_TO_UNIX_SECS: i64 = 62_135_596_800;

/// The fixed metric set. `Default` yields the sentinel for every field, so a
/// freshly-constructed payload is already a valid "nothing present" tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorPayload {
    pub baro_temperature: f64,
    pub baro_airpressure: f64,
    pub baro_altitude: f64,
    pub aq_iaq_index: i32,
    pub aq_iaq_accuracy: u8,
    pub aq_temperature: f64,
    pub aq_humidity: f64,
    pub aq_air_pressure: f64,
    pub al_illuminance: f64,
    pub motion_detector: bool,
}

impl SensorPayload {
    /// Apply raw barometer readings (1/100 °C, 1/1000 hPa, 1/1000 m).
    pub fn set_barometer(&mut self, temperature: i32, air_pressure: i32, altitude: i32) {
        self.baro_temperature = f64::from(temperature) / 100.0;
        self.baro_airpressure = f64::from(air_pressure) / 1000.0;
        self.baro_altitude = f64::from(altitude) / 1000.0;
    }

    /// Apply raw air quality readings. Index and accuracy stay raw.
    pub fn set_air_quality(&mut self, values: &AirQualityValues) {
        self.aq_iaq_index = values.iaq_index;
        self.aq_iaq_accuracy = values.iaq_index_accuracy;
        self.aq_temperature = f64::from(values.temperature) / 100.0;
        self.aq_humidity = f64::from(values.humidity) / 100.0;
        self.aq_air_pressure = f64::from(values.air_pressure) / 100.0;
    }

    /// Apply a raw illuminance reading (1/100 lx).
    pub fn set_ambient_light(&mut self, illuminance: u32) {
        self.al_illuminance = f64::from(illuminance) / 100.0;
    }

    pub fn set_motion(&mut self, detected: bool) {
        self.motion_detector = detected;
    }
}

/// One assembled reading. Immutable; consumed by a single publish and then
/// discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub captured_at: DateTime<Utc>,
    /// Strictly decreasing ordering counter, see [`reverse_timestamp`].
    pub reverse_timestamp: i64,
    pub payload: SensorPayload,
}

/// Remaining 100 ns ticks until the ceiling `i64::MAX`, counted from year 1.
///
/// Later captures yield strictly smaller values, which is what the upstream
/// consumer uses for ordering and dedup.
pub fn reverse_timestamp(at: DateTime<Utc>) -> i64 {
    let ticks_since_year_one = (at.timestamp() + YEAR_ONE_TO_UNIX_SECS) * TICKS_PER_SECOND
        + i64::from(at.timestamp_subsec_nanos() / 100);
    i64::MAX - ticks_since_year_one
}

/// Assemble one reading from whatever the registry currently holds. Never
/// fails; missing or unreadable peripherals leave their sentinel fields.
pub async fn assemble(registry: &DeviceRegistry) -> Reading {
    let captured_at = Utc::now();
    let mut payload = SensorPayload::default();

    if let Some(barometer) = registry.barometer() {
        match barometer_group(&barometer).await {
            Ok((temperature, air_pressure, altitude)) => {
                payload.set_barometer(temperature, air_pressure, altitude);
            }
            Err(e) => warn!(error = %e, "barometer read failed, defaulting for this tick"),
        }
    }

    if let Some(air_quality) = registry.air_quality() {
        match air_quality.all_values().await {
            Ok(values) => payload.set_air_quality(&values),
            Err(e) => warn!(error = %e, "air quality read failed, defaulting for this tick"),
        }
    }

    if let Some(ambient_light) = registry.ambient_light() {
        match ambient_light.illuminance().await {
            Ok(illuminance) => payload.set_ambient_light(illuminance),
            Err(e) => warn!(error = %e, "ambient light read failed, defaulting for this tick"),
        }
    }

    if let Some(motion_detector) = registry.motion_detector() {
        match motion_detector.motion_detected().await {
            Ok(detected) => payload.set_motion(detected),
            Err(e) => warn!(error = %e, "motion detector read failed, defaulting for this tick"),
        }
    }

    Reading {
        captured_at,
        reverse_timestamp: reverse_timestamp(captured_at),
        payload,
    }
}

async fn barometer_group(barometer: &brickbus::BarometerV2) -> brickbus::Result<(i32, i32, i32)> {
    Ok((
        barometer.temperature().await?,
        barometer.air_pressure().await?,
        barometer.altitude().await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_payload_is_all_sentinels() {
        let payload = SensorPayload::default();
        assert_eq!(payload.baro_temperature, 0.0);
        assert_eq!(payload.aq_iaq_index, 0);
        assert_eq!(payload.aq_iaq_accuracy, 0);
        assert_eq!(payload.al_illuminance, 0.0);
        assert!(!payload.motion_detector);
    }

    #[test]
    fn test_barometer_scaling() {
        let mut payload = SensorPayload::default();
        payload.set_barometer(2350, 1_013_250, 120_000);
        assert_eq!(payload.baro_temperature, 23.5);
        assert_eq!(payload.baro_airpressure, 1013.25);
        assert_eq!(payload.baro_altitude, 120.0);
    }

    #[test]
    fn test_air_quality_scaling_keeps_index_raw() {
        let mut payload = SensorPayload::default();
        payload.set_air_quality(&AirQualityValues {
            iaq_index: 59,
            iaq_index_accuracy: 3,
            temperature: 2213,
            humidity: 4387,
            air_pressure: 101_325,
        });

        assert_eq!(payload.aq_iaq_index, 59);
        assert_eq!(payload.aq_iaq_accuracy, 3);
        assert_eq!(payload.aq_temperature, 22.13);
        assert_eq!(payload.aq_humidity, 43.87);
        assert_eq!(payload.aq_air_pressure, 1013.25);
    }

    #[test]
    fn test_ambient_light_scaling() {
        let mut payload = SensorPayload::default();
        payload.set_ambient_light(13_753);
        assert_eq!(payload.al_illuminance, 137.53);
    }

    #[test]
    fn test_reverse_timestamp_strictly_decreasing() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::microseconds(1);
        let t3 = t1 + chrono::Duration::seconds(60);

        assert!(reverse_timestamp(t1) > reverse_timestamp(t2));
        assert!(reverse_timestamp(t2) > reverse_timestamp(t3));
    }

    #[test]
    fn test_reverse_timestamp_tick_resolution() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::seconds(1);

        // Exactly one second apart means exactly 10^7 ticks apart.
        assert_eq!(
            reverse_timestamp(t1) - reverse_timestamp(t2),
            10_000_000
        );
    }

    #[tokio::test]
    async fn test_assemble_on_empty_registry_yields_sentinels() {
        let registry = DeviceRegistry::new();
        let reading = assemble(&registry).await;

        assert_eq!(reading.payload, SensorPayload::default());
        assert_eq!(
            reading.reverse_timestamp,
            reverse_timestamp(reading.captured_at)
        );
    }
}
