//! Protocol definitions for CFE-HYDRO
//!
//! This module defines the core types used in the CFE-HDP protocol:
//! - Interpolation hints (the closed set of reconstruction models)
//! - Readings as produced by the sensor collaborator
//! - The typed packet envelope and its transmitted readings
//!
//! All times are epoch milliseconds and all intervals are milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Epoch timestamp in milliseconds
pub type TimestampMs = u64;

/// Default pub/sub topic for CFE-HDP packets
pub const DEFAULT_TOPIC: &str = "cfe-hydro/data";

/// Reconstruction model a sender asserts for a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationHint {
    /// Piecewise-linear through the samples
    #[default]
    Linear,
    /// `a·ln(t − t0) + b`: fast initial change then saturation
    Logarithmic,
    /// Least-squares polynomial of configurable degree
    Polynomial,
    /// `L / (1 + e^{−k(t−t0)})`: bounded growth
    Sigmoidal,
}

impl InterpolationHint {
    /// All hints, in wire order
    pub const ALL: [InterpolationHint; 4] = [
        InterpolationHint::Linear,
        InterpolationHint::Logarithmic,
        InterpolationHint::Polynomial,
        InterpolationHint::Sigmoidal,
    ];

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpolationHint::Linear => "linear",
            InterpolationHint::Logarithmic => "logarithmic",
            InterpolationHint::Polynomial => "polynomial",
            InterpolationHint::Sigmoidal => "sigmoidal",
        }
    }

    /// Minimum accepted samples before the hinted model replaces the
    /// Linear fallback
    pub fn min_samples(&self, polynomial_degree: usize) -> usize {
        match self {
            InterpolationHint::Linear => 2,
            InterpolationHint::Logarithmic => 3,
            InterpolationHint::Polynomial => polynomial_degree + 1,
            InterpolationHint::Sigmoidal => 3,
        }
    }
}

impl fmt::Display for InterpolationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationHint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "linear" => Ok(InterpolationHint::Linear),
            "logarithmic" => Ok(InterpolationHint::Logarithmic),
            "polynomial" => Ok(InterpolationHint::Polynomial),
            "sigmoidal" => Ok(InterpolationHint::Sigmoidal),
            other => Err(format!("unknown interpolation '{}'", other)),
        }
    }
}

/// One high-rate sample from the sensor collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Signal the sample belongs to
    pub signal_id: String,
    /// The measured value
    pub value: f64,
    /// When the sample was taken (epoch ms)
    pub sample_time: TimestampMs,
}

impl Reading {
    /// Create a new reading
    pub fn new(signal_id: impl Into<String>, value: f64, sample_time: TimestampMs) -> Self {
        Self {
            signal_id: signal_id.into(),
            value,
            sample_time,
        }
    }
}

/// A sparse sample with its denormalized descriptor metadata, as carried
/// on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TransmittedReading {
    /// Signal identifier (`sensor_type` on the wire)
    pub signal_id: String,
    /// The measured value
    pub value: f64,
    /// Original sample time (epoch ms)
    pub sample_time: TimestampMs,
    /// Model the receiver should apply
    pub interpolation_hint: InterpolationHint,
    /// Physical unit label
    pub unit: String,
    /// Human-readable description
    pub description: String,
    /// Lower bound of the optimal range (reporting only)
    pub optimal_min: f64,
    /// Upper bound of the optimal range (reporting only)
    pub optimal_max: f64,
}

impl TransmittedReading {
    /// Whether the value lies inside the descriptor's optimal range
    pub fn in_optimal_range(&self) -> bool {
        self.value >= self.optimal_min && self.value <= self.optimal_max
    }
}

/// Sender diagnostics block; opaque to the reconstructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemInfo {
    /// Free memory on the device, in bytes
    pub free_heap: u64,
    /// Link quality indicator (dBm)
    pub wifi_rssi: i32,
    /// Seconds since device boot
    pub uptime: u64,
}

/// Typed CFE-HDP envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Sending device
    pub device_id: String,
    /// When the packet was built (epoch ms)
    pub transmission_timestamp: TimestampMs,
    /// High-rate sampling period (ms)
    pub sampling_interval: u64,
    /// Window length (ms)
    pub transmission_interval: u64,
    /// Sparse readings, ordered by signal then sample time
    pub readings: Vec<TransmittedReading>,
    /// Diagnostics
    pub system: SystemInfo,
}

impl Packet {
    /// Signal ids present in this packet, in first-seen order
    pub fn signal_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for reading in &self.readings {
            if !ids.contains(&reading.signal_id.as_str()) {
                ids.push(&reading.signal_id);
            }
        }
        ids
    }

    /// Readings for one signal
    pub fn readings_for<'a>(
        &'a self,
        signal_id: &'a str,
    ) -> impl Iterator<Item = &'a TransmittedReading> + 'a {
        self.readings
            .iter()
            .filter(move |r| r.signal_id == signal_id)
    }

    /// Whether the packet carries no readings at all
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
