// CFE-HYDRO Node - Sensor sources
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Sensor sources for the accumulator task.
//!
//! Both sources are positioned on the node clock with [`NodeSensor::seek`]
//! before each sampling pass, then read through the protocol's
//! [`SensorSource`] trait.

use crate::error::{NodeError, NodeResult};
use cfe_hydro::{SensorError, SensorSource, TimestampMs};
use cfe_hydro_testdata::{SensorConfig, Simulator};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// A sensor source driven by the node clock.
pub trait NodeSensor: SensorSource + Send {
    /// Move to node time `now_ms`. Returns false once the source has no
    /// more data.
    fn seek(&mut self, now_ms: TimestampMs) -> bool;

    /// Node time at which the source's data begins.
    fn start_ms(&self) -> TimestampMs;
}

fn fault(signal_id: &str, reason: impl Into<String>) -> SensorError {
    SensorError::SensorFault {
        signal_id: signal_id.to_string(),
        reason: reason.into(),
    }
}

/// Live readings from synthetic patterns.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    simulator: Simulator,
    start_ms: TimestampMs,
    now_ms: TimestampMs,
}

impl SimulatedSensor {
    pub fn new(sensors: Vec<SensorConfig>, start_ms: TimestampMs, seed: Option<u64>) -> Self {
        Self {
            simulator: Simulator::new(sensors, start_ms, seed),
            start_ms,
            now_ms: start_ms,
        }
    }

    /// Noise-free value at node time `t`.
    pub fn truth(&self, signal_id: &str, t: TimestampMs) -> Option<f64> {
        self.simulator.truth(signal_id, t)
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self, signal_id: &str) -> Result<f64, SensorError> {
        if self.simulator.sensor(signal_id).is_none() {
            return Err(fault(signal_id, "no simulated sensor"));
        }
        self.simulator
            .read(signal_id, self.now_ms)
            .ok_or_else(|| fault(signal_id, "read dropout"))
    }
}

impl NodeSensor for SimulatedSensor {
    fn seek(&mut self, now_ms: TimestampMs) -> bool {
        self.now_ms = now_ms;
        true
    }

    fn start_ms(&self) -> TimestampMs {
        self.start_ms
    }
}

/// One replayed row.
#[derive(Debug, Clone, PartialEq)]
struct ReplayRow {
    timestamp_ms: TimestampMs,
    values: Vec<Option<f64>>,
}

/// Recorded readings replayed from a CSV file.
///
/// The header names one column per signal. A `timestamp_ms` column is
/// optional; without it, rows are spaced by the sampling interval. Either
/// `,` or `;` delimits fields. Empty or unparseable cells read as faults.
/// The last row stays current for one sampling interval.
#[derive(Debug, Clone)]
pub struct CsvReplaySensor {
    signal_ids: Vec<String>,
    rows: Vec<ReplayRow>,
    cursor: Option<usize>,
    hold_ms: u64,
}

impl CsvReplaySensor {
    /// Load a replay file.
    pub fn from_path(path: impl AsRef<Path>, sampling_interval_ms: u64) -> NodeResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NodeError::FileNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        let sensor = Self::parse(&text, sampling_interval_ms)?;
        info!(
            "Loaded replay: {} signals, {} rows from {}",
            sensor.signal_ids.len(),
            sensor.rows.len(),
            path.display()
        );
        Ok(sensor)
    }

    /// Parse replay text.
    pub fn parse(text: &str, sampling_interval_ms: u64) -> NodeResult<Self> {
        let header_line = text.lines().next().ok_or(NodeError::EmptyDataset)?;
        let delimiter = if header_line.contains(';') { b';' } else { b',' };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.clone();
        let timestamp_col = headers.iter().position(|h| h == "timestamp_ms");
        let columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != timestamp_col)
            .map(|(i, h)| (i, h.to_string()))
            .collect();
        if columns.is_empty() {
            return Err(NodeError::InvalidFormat(
                "header names no signal columns".to_string(),
            ));
        }

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let timestamp_ms = match timestamp_col {
                Some(col) => record
                    .get(col)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        NodeError::InvalidFormat(format!("invalid timestamp on row {}", index + 1))
                    })?,
                None => index as u64 * sampling_interval_ms,
            };
            let values = columns
                .iter()
                .map(|(col, _)| record.get(*col).and_then(|s| s.parse::<f64>().ok()))
                .collect();
            rows.push(ReplayRow {
                timestamp_ms,
                values,
            });
        }

        if rows.is_empty() {
            return Err(NodeError::EmptyDataset);
        }
        if rows.windows(2).any(|w| w[1].timestamp_ms < w[0].timestamp_ms) {
            return Err(NodeError::InvalidFormat(
                "timestamps must not decrease".to_string(),
            ));
        }

        Ok(Self {
            signal_ids: columns.into_iter().map(|(_, id)| id).collect(),
            rows,
            cursor: None,
            hold_ms: sampling_interval_ms.max(1),
        })
    }

    pub fn signal_ids(&self) -> &[String] {
        &self.signal_ids
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Time between first and last row.
    pub fn duration_ms(&self) -> u64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }
}

impl SensorSource for CsvReplaySensor {
    fn read(&mut self, signal_id: &str) -> Result<f64, SensorError> {
        let col = self
            .signal_ids
            .iter()
            .position(|s| s == signal_id)
            .ok_or_else(|| fault(signal_id, "not in replay file"))?;
        let row = self
            .cursor
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| fault(signal_id, "replay has not started"))?;
        row.values[col].ok_or_else(|| fault(signal_id, "missing value in replay row"))
    }
}

impl NodeSensor for CsvReplaySensor {
    fn seek(&mut self, now_ms: TimestampMs) -> bool {
        let Some(last) = self.rows.last() else {
            return false;
        };
        if now_ms >= last.timestamp_ms + self.hold_ms {
            return false;
        }
        // Latest row at or before now
        let upto = self.rows.partition_point(|r| r.timestamp_ms <= now_ms);
        self.cursor = upto.checked_sub(1);
        if let Some(i) = self.cursor {
            debug!("replay row {} at {}", i, self.rows[i].timestamp_ms);
        }
        true
    }

    fn start_ms(&self) -> TimestampMs {
        self.rows.first().map_or(0, |r| r.timestamp_ms)
    }
}
