//! Decoder module
//!
//! This module parses raw CFE-HDP bytes back into a typed [`Packet`].
//! Decoding is all-or-nothing: any structural problem yields
//! [`DecodeError::MalformedPacket`] and no packet.

use crate::error::DecodeError;
use crate::protocol::Packet;
use crate::wire::WirePacket;
use log::warn;

/// Parse one packet
///
/// Unknown fields are ignored, so packets from newer senders that keep the
/// required fields still decode.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let wire: WirePacket =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::malformed(e.to_string()))?;
    Packet::try_from(wire)
}

/// Decoder for CFE-HDP packets that keeps simple counters
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    decoded: u64,
    rejected: u64,
    last_timestamp: Option<u64>,
}

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode bytes, counting successes and rejections
    pub fn decode(&mut self, bytes: &[u8]) -> Result<Packet, DecodeError> {
        match decode(bytes) {
            Ok(packet) => {
                self.decoded += 1;
                self.last_timestamp = Some(packet.transmission_timestamp);
                Ok(packet)
            }
            Err(e) => {
                self.rejected += 1;
                warn!("dropping packet: {}", e);
                Err(e)
            }
        }
    }

    /// Packets decoded successfully
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Packets rejected as malformed
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Transmission timestamp of the last good packet
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Reset counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
