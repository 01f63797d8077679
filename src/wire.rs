//! Serde mirror of the CFE-HDP JSON envelope
//!
//! The typed [`Packet`](crate::protocol::Packet) is what the rest of the
//! crate works with; these structs exist only to pin the field names and
//! shapes that travel on the wire.
//!
//! ```text
//! {
//!   "device_id": "cfe-hydro-01",
//!   "transmission_timestamp": 1741787109123,
//!   "sampling_interval": 10000,
//!   "transmission_interval": 300000,
//!   "readings": [
//!     { "sensor_type": "ph", "value": 6.12, "timestamp": 1741787010000,
//!       "interpolation": "logarithmic",
//!       "metadata": { "unit": "pH", "description": "Hydrogen potential",
//!                     "optimal_min": 5.5, "optimal_max": 6.5 } }
//!   ],
//!   "system": { "free_heap": 180344, "wifi_rssi": -61, "uptime": 5400 }
//! }
//! ```

use crate::error::DecodeError;
use crate::protocol::{InterpolationHint, Packet, SystemInfo, TimestampMs, TransmittedReading};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Text form of `transmission_timestamp` emitted by older firmware
pub const TEXT_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S%.3f";

/// `transmission_timestamp` as found on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    /// Epoch milliseconds
    Millis(u64),
    /// `DD/MM/YYYY HH:MM:SS.mmm`, UTC
    Text(String),
}

impl WireTimestamp {
    /// Resolve to epoch milliseconds
    pub fn to_millis(&self) -> Result<TimestampMs, DecodeError> {
        match self {
            WireTimestamp::Millis(ms) => Ok(*ms),
            WireTimestamp::Text(text) => parse_text_timestamp(text),
        }
    }
}

/// Parse the text timestamp form as UTC
pub fn parse_text_timestamp(text: &str) -> Result<TimestampMs, DecodeError> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TEXT_TIMESTAMP_FORMAT).map_err(|e| {
        DecodeError::malformed(format!("transmission_timestamp '{}': {}", text, e))
    })?;
    let millis = Utc.from_utc_datetime(&naive).timestamp_millis();
    u64::try_from(millis)
        .map_err(|_| DecodeError::malformed(format!("transmission_timestamp '{}' predates 1970", text)))
}

/// Format epoch milliseconds in the text form
pub fn format_text_timestamp(ms: TimestampMs) -> Option<String> {
    let ms = i64::try_from(ms).ok()?;
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format(TEXT_TIMESTAMP_FORMAT).to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMetadata {
    pub unit: String,
    pub description: String,
    pub optimal_min: f64,
    pub optimal_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReading {
    pub sensor_type: String,
    pub value: f64,
    /// Sample time; inherits the packet timestamp when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampMs>,
    /// Kept as text so an unknown model name is reported, not defaulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpolation: Option<String>,
    pub metadata: WireMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WireSystem {
    #[serde(default)]
    pub free_heap: u64,
    #[serde(default)]
    pub wifi_rssi: i32,
    #[serde(default)]
    pub uptime: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePacket {
    pub device_id: String,
    pub transmission_timestamp: WireTimestamp,
    pub sampling_interval: u64,
    pub transmission_interval: u64,
    pub readings: Vec<WireReading>,
    #[serde(default)]
    pub system: WireSystem,
}

impl From<&TransmittedReading> for WireReading {
    fn from(r: &TransmittedReading) -> Self {
        Self {
            sensor_type: r.signal_id.clone(),
            value: r.value,
            timestamp: Some(r.sample_time),
            interpolation: Some(r.interpolation_hint.as_str().to_string()),
            metadata: WireMetadata {
                unit: r.unit.clone(),
                description: r.description.clone(),
                optimal_min: r.optimal_min,
                optimal_max: r.optimal_max,
            },
        }
    }
}

impl From<&Packet> for WirePacket {
    fn from(p: &Packet) -> Self {
        Self {
            device_id: p.device_id.clone(),
            transmission_timestamp: WireTimestamp::Millis(p.transmission_timestamp),
            sampling_interval: p.sampling_interval,
            transmission_interval: p.transmission_interval,
            readings: p.readings.iter().map(WireReading::from).collect(),
            system: WireSystem {
                free_heap: p.system.free_heap,
                wifi_rssi: p.system.wifi_rssi,
                uptime: p.system.uptime,
            },
        }
    }
}

impl TryFrom<WirePacket> for Packet {
    type Error = DecodeError;

    fn try_from(wire: WirePacket) -> Result<Self, Self::Error> {
        let transmission_timestamp = wire.transmission_timestamp.to_millis()?;

        let mut readings = Vec::with_capacity(wire.readings.len());
        for (i, r) in wire.readings.into_iter().enumerate() {
            if r.sensor_type.is_empty() {
                return Err(DecodeError::malformed(format!(
                    "readings[{}]: empty sensor_type",
                    i
                )));
            }
            if !r.value.is_finite() {
                return Err(DecodeError::malformed(format!(
                    "readings[{}]: non-finite value",
                    i
                )));
            }
            let interpolation_hint = match r.interpolation.as_deref() {
                None => InterpolationHint::default(),
                Some(text) => text
                    .parse::<InterpolationHint>()
                    .map_err(|e| DecodeError::malformed(format!("readings[{}]: {}", i, e)))?,
            };
            readings.push(TransmittedReading {
                signal_id: r.sensor_type,
                value: r.value,
                sample_time: r.timestamp.unwrap_or(transmission_timestamp),
                interpolation_hint,
                unit: r.metadata.unit,
                description: r.metadata.description,
                optimal_min: r.metadata.optimal_min,
                optimal_max: r.metadata.optimal_max,
            });
        }

        Ok(Packet {
            device_id: wire.device_id,
            transmission_timestamp,
            sampling_interval: wire.sampling_interval,
            transmission_interval: wire.transmission_interval,
            readings,
            system: SystemInfo {
                free_heap: wire.system.free_heap,
                wifi_rssi: wire.system.wifi_rssi,
                uptime: wire.system.uptime,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_timestamp_parse() {
        let ms = parse_text_timestamp("12/03/2025 14:05:09.123").unwrap();
        assert_eq!(ms, 1_741_788_309_123);
        assert_eq!(
            format_text_timestamp(ms).as_deref(),
            Some("12/03/2025 14:05:09.123")
        );
    }

    #[test]
    fn test_text_timestamp_rejects_garbage() {
        assert!(parse_text_timestamp("2025-03-12T14:05:09Z").is_err());
        assert!(parse_text_timestamp("").is_err());
    }

    #[test]
    fn test_timestamp_untagged_forms() {
        let millis: WireTimestamp = serde_json::from_str("1741788309123").unwrap();
        assert_eq!(millis, WireTimestamp::Millis(1_741_788_309_123));

        let text: WireTimestamp = serde_json::from_str("\"01/01/1970 00:00:01.500\"").unwrap();
        assert_eq!(text.to_millis().unwrap(), 1_500);

        assert!(serde_json::from_str::<WireTimestamp>("-5").is_err());
    }

    #[test]
    fn test_reading_defaults() {
        let json = r#"{"device_id":"d","transmission_timestamp":42,
            "sampling_interval":1,"transmission_interval":2,
            "readings":[{"sensor_type":"ec","value":1.5,
                         "metadata":{"unit":"mS/cm","description":"",
                                     "optimal_min":1,"optimal_max":3}}]}"#;
        let wire: WirePacket = serde_json::from_str(json).unwrap();
        let packet = Packet::try_from(wire).unwrap();
        assert_eq!(packet.readings[0].sample_time, 42);
        assert_eq!(packet.readings[0].interpolation_hint, InterpolationHint::Linear);
        assert_eq!(packet.system, SystemInfo::default());
    }
}
