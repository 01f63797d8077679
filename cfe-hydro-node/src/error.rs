// CFE-HYDRO Node - Error types
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Node errors.

use cfe_hydro::CfeError;

/// Node errors.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] CfeError),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type NodeResult<T> = Result<T, NodeError>;
