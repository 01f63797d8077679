// CFE-HYDRO Node - Simulated sender/receiver node
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! # CFE-HYDRO Node
//!
//! Runs both ends of a CFE-HYDRO link in one process: a sampling sender
//! fed by a simulated or replayed sensor, an in-process broker, and a
//! receiver that reconstructs every signal. Progress is exposed as
//! Prometheus metrics.

pub mod error;
pub mod export;
pub mod mailbox;
pub mod metrics;
pub mod runtime;
pub mod sensor;
pub mod server;

pub use error::{NodeError, NodeResult};
pub use export::{export_reconstruction, write_reconstruction};
pub use mailbox::Mailbox;
pub use runtime::{run_node, NodeClock, NodeConfig, NodeReport, ReceiverReport};
pub use sensor::{CsvReplaySensor, NodeSensor, SimulatedSensor};
