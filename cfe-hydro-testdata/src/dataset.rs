// CFE-HYDRO Testdata - Dataset structures
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Generated datasets and their CSV/JSON forms.
//!
//! Each row carries both the sensor reading (noisy, possibly missing) and
//! the noise-free value it was derived from.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Dataset error types.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error at line {line}: {message}")]
    CsvParse { line: usize, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Empty dataset")]
    Empty,
}

/// One sampling instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    /// Timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Sensor readings in column order; `None` is a dropout.
    pub readings: Vec<Option<f64>>,
    /// Noise-free values in column order.
    pub truth: Vec<f64>,
}

/// Time series for a fixed set of signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Column order.
    pub signal_ids: Vec<String>,
    pub rows: Vec<DatasetRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(signal_ids: Vec<String>) -> Self {
        Self {
            signal_ids,
            rows: Vec::new(),
            seed: None,
        }
    }

    /// Append a row.
    pub fn push(&mut self, row: DatasetRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Span between first and last row.
    pub fn duration_ms(&self) -> u64 {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        }
    }

    fn column_index(&self, signal_id: &str) -> Option<usize> {
        self.signal_ids.iter().position(|s| s == signal_id)
    }

    /// Readings of one signal, dropouts skipped.
    pub fn series(&self, signal_id: &str) -> Vec<(u64, f64)> {
        let Some(col) = self.column_index(signal_id) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| {
                row.readings
                    .get(col)
                    .copied()
                    .flatten()
                    .map(|v| (row.timestamp_ms, v))
            })
            .collect()
    }

    /// Noise-free values of one signal at every row.
    pub fn ground_truth(&self, signal_id: &str) -> Vec<(u64, f64)> {
        let Some(col) = self.column_index(signal_id) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.truth.get(col).map(|v| (row.timestamp_ms, *v)))
            .collect()
    }

    /// Write readings as CSV: `timestamp_ms` then one column per signal.
    pub fn write_csv<W: Write>(&self, writer: &mut W, delimiter: char) -> Result<(), DatasetError> {
        write!(writer, "timestamp_ms")?;
        for id in &self.signal_ids {
            write!(writer, "{}{}", delimiter, id)?;
        }
        writeln!(writer)?;

        for row in &self.rows {
            write!(writer, "{}", row.timestamp_ms)?;
            for value in &row.readings {
                match value {
                    Some(v) => write!(writer, "{}{:.6}", delimiter, v)?,
                    None => write!(writer, "{}", delimiter)?,
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Export readings to a comma-separated file.
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_csv(&mut writer, ',')?;
        writer.flush()?;
        Ok(())
    }

    /// Import readings from CSV; `,` or `;` delimited, picked from the
    /// header. Truth is not stored in CSV and comes back as NaN.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = lines.next().ok_or(DatasetError::Empty)??;
        let delimiter = if header.contains(';') { ';' } else { ',' };
        let columns: Vec<&str> = header.split(delimiter).map(str::trim).collect();
        if columns.first() != Some(&"timestamp_ms") {
            return Err(DatasetError::MissingColumn("timestamp_ms".to_string()));
        }

        let signal_ids: Vec<String> = columns[1..].iter().map(|s| s.to_string()).collect();
        let mut dataset = Dataset::new(signal_ids);

        for (line_num, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(delimiter).collect();
            let timestamp_ms: u64 =
                fields[0].trim().parse().map_err(|_| DatasetError::CsvParse {
                    line: line_num + 2,
                    message: "Invalid timestamp".to_string(),
                })?;

            let mut readings = Vec::with_capacity(dataset.signal_ids.len());
            for (i, id) in dataset.signal_ids.iter().enumerate() {
                let field = fields.get(i + 1).map(|s| s.trim()).unwrap_or("");
                if field.is_empty() {
                    readings.push(None);
                } else {
                    readings.push(Some(field.parse().map_err(|_| DatasetError::CsvParse {
                        line: line_num + 2,
                        message: format!("Invalid value for {}", id),
                    })?));
                }
            }
            let truth = vec![f64::NAN; readings.len()];
            dataset.rows.push(DatasetRow {
                timestamp_ms,
                readings,
                truth,
            });
        }

        Ok(dataset)
    }

    /// Export everything, truth included, as JSON.
    pub fn to_json(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Import from JSON.
    pub fn from_json(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
