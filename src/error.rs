//! Error types for CFE-HYDRO
//!
//! This module defines all error types used throughout the library.
//! Each pipeline stage has its own error enum; [`CfeError`] wraps them so
//! callers that do not care about the stage can use a single `Result`.

use thiserror::Error;

/// Result type alias for CFE-HYDRO operations
pub type Result<T> = std::result::Result<T, CfeError>;

/// Main error type for CFE-HYDRO operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CfeError {
    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Reconstruction error
    #[error("Reconstruction error: {0}")]
    Reconstruct(#[from] ReconstructError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Sensor error
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Errors during packet encoding
///
/// Encoding never fails as a whole: an `EncodeError` drops the offending
/// reading and the rest of the packet is still produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// Reading references a signal with no registered descriptor
    #[error("Unknown signal: {signal_id}")]
    UnknownSignal { signal_id: String },

    /// Value is not a finite number and cannot be placed on the wire
    #[error("Non-finite value for signal {signal_id}")]
    NonFiniteValue { signal_id: String },

    /// Envelope could not be serialized
    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors during packet decoding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Structurally invalid packet (missing field, wrong type, bad timestamp)
    #[error("Malformed packet: {reason}")]
    MalformedPacket { reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }
}

/// Errors and degraded conditions on the receiver side
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructError {
    /// No sample has been accepted for the signal yet
    #[error("No data for signal {signal_id}")]
    NoData { signal_id: String },

    /// Fewer samples than the hinted model needs; Linear fallback in use
    #[error("Insufficient samples: {model} needs {needed}, have {available}")]
    InsufficientSamples {
        model: &'static str,
        needed: usize,
        available: usize,
    },

    /// Nonlinear fit did not converge; Linear fallback in use
    #[error("{model} fit diverged after {iterations} iterations")]
    FitDiverged {
        model: &'static str,
        iterations: u32,
    },
}

/// Errors related to the pub/sub transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Broker unreachable or link down; the packet in flight is abandoned
    #[error("Transport unavailable: {reason}")]
    TransportUnavailable { reason: String },

    /// Session is not connected (publish attempted while disconnected)
    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            reason: reason.into(),
        }
    }
}

/// Errors reported by the sensor collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// Sensor could not produce a reading
    #[error("Sensor fault on {signal_id}: {reason}")]
    SensorFault { signal_id: String, reason: String },
}
