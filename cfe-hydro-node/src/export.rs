// CFE-HYDRO Node - Reconstruction export
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! CSV export of dense reconstructed series.

use crate::error::NodeResult;
use cfe_hydro::{ReconstructionState, TimestampMs};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Write every state resampled on a shared grid.
///
/// Columns are `timestamp_ms` then one per signal. The grid spans the
/// union of the signals' sample ranges; a signal with no estimate at a grid
/// point leaves the cell empty. Returns the number of rows written.
pub fn write_reconstruction<W: Write>(
    writer: W,
    states: &[ReconstructionState],
    step: Duration,
) -> NodeResult<usize> {
    let mut out = csv::Writer::from_writer(writer);
    let mut header = vec!["timestamp_ms".to_string()];
    header.extend(states.iter().map(|s| s.signal_id().to_string()));
    out.write_record(&header)?;

    let ranges: Vec<(TimestampMs, TimestampMs)> =
        states.iter().filter_map(|s| s.time_range()).collect();
    let (Some(start), Some(end)) = (
        ranges.iter().map(|r| r.0).min(),
        ranges.iter().map(|r| r.1).max(),
    ) else {
        out.flush()?;
        return Ok(0);
    };

    let mut grid: BTreeMap<TimestampMs, Vec<Option<f64>>> = BTreeMap::new();
    for (col, state) in states.iter().enumerate() {
        match state.resample(start, end, step) {
            Ok(series) => {
                for (t, value) in series {
                    grid.entry(t).or_insert_with(|| vec![None; states.len()])[col] = Some(value);
                }
            }
            Err(e) => warn!("{} not exported: {}", state.signal_id(), e),
        }
    }

    for (t, values) in &grid {
        let mut record = vec![t.to_string()];
        record.extend(
            values
                .iter()
                .map(|v| v.map_or_else(String::new, |v| format!("{:.6}", v))),
        );
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(grid.len())
}

/// Export to a file.
pub fn export_reconstruction(
    path: impl AsRef<Path>,
    states: &[ReconstructionState],
    step: Duration,
) -> NodeResult<usize> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    let rows = write_reconstruction(file, states, step)?;
    info!("Exported {} rows to {}", rows, path.display());
    Ok(rows)
}
