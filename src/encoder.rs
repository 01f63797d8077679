//! Encoder module
//!
//! This module builds CFE-HDP packets from subsampled readings. Encoding is
//! pure: the caller supplies the clock and diagnostics. A reading that
//! cannot be encoded is dropped and reported; the rest of the packet is
//! still produced.

use crate::config::SenderConfig;
use crate::error::{EncodeError, Result};
use crate::protocol::{Packet, SystemInfo, TimestampMs, TransmittedReading};
use crate::registry::SignalRegistry;
use crate::subsampler::SparseSignal;
use crate::wire::WirePacket;
use log::warn;

/// Result of encoding one window
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutcome {
    /// The packet, possibly without some readings
    pub packet: Packet,
    /// Readings dropped during encoding, one error each
    pub dropped: Vec<EncodeError>,
}

/// Encoder for CFE-HDP packets
#[derive(Debug, Clone)]
pub struct Encoder {
    device_id: String,
    sampling_interval: u64,
    transmission_interval: u64,
    /// Packets produced so far
    packets: u64,
}

impl Encoder {
    /// Create a new encoder
    pub fn new(device_id: impl Into<String>, sampling_interval: u64, transmission_interval: u64) -> Self {
        Self {
            device_id: device_id.into(),
            sampling_interval,
            transmission_interval,
            packets: 0,
        }
    }

    /// Create an encoder from sender configuration
    pub fn from_config(config: &SenderConfig) -> Self {
        Self::new(
            config.device_id.clone(),
            config.sampling_interval_ms,
            config.transmission_interval_ms,
        )
    }

    /// Device id stamped on every packet
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Number of packets encoded
    pub fn packets_encoded(&self) -> u64 {
        self.packets
    }

    /// Build a packet from per-signal sparse readings
    ///
    /// Each transmitted reading carries its descriptor's metadata and hint
    /// as registered right now. Readings of unregistered signals, and
    /// non-finite values, are dropped.
    pub fn encode(
        &mut self,
        signals: &[SparseSignal],
        registry: &SignalRegistry,
        now: TimestampMs,
        system: SystemInfo,
    ) -> EncodeOutcome {
        let mut readings = Vec::new();
        let mut dropped = Vec::new();

        for signal in signals {
            let Some(descriptor) = registry.get(&signal.signal_id) else {
                warn!(
                    "dropping {} readings of unregistered signal {}",
                    signal.readings.len(),
                    signal.signal_id
                );
                dropped.extend(signal.readings.iter().map(|_| EncodeError::UnknownSignal {
                    signal_id: signal.signal_id.clone(),
                }));
                continue;
            };

            for reading in &signal.readings {
                if !reading.value.is_finite() {
                    warn!("dropping non-finite reading of {}", signal.signal_id);
                    dropped.push(EncodeError::NonFiniteValue {
                        signal_id: signal.signal_id.clone(),
                    });
                    continue;
                }
                readings.push(TransmittedReading {
                    signal_id: descriptor.signal_id.clone(),
                    value: reading.value,
                    sample_time: reading.sample_time,
                    interpolation_hint: descriptor.interpolation_hint,
                    unit: descriptor.unit.clone(),
                    description: descriptor.description.clone(),
                    optimal_min: descriptor.optimal_min,
                    optimal_max: descriptor.optimal_max,
                });
            }
        }

        self.packets += 1;
        EncodeOutcome {
            packet: Packet {
                device_id: self.device_id.clone(),
                transmission_timestamp: now,
                sampling_interval: self.sampling_interval,
                transmission_interval: self.transmission_interval,
                readings,
                system,
            },
            dropped,
        }
    }
}

/// Serialize a packet to its JSON wire form
pub fn to_bytes(packet: &Packet) -> Result<Vec<u8>> {
    serde_json::to_vec(&WirePacket::from(packet)).map_err(|e| {
        EncodeError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}
