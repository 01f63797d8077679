// CFE-HYDRO Testdata - Synthetic sensor data
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! # CFE-HYDRO Testdata
//!
//! Synthetic hydroponic sensor data with known ground truth, for scoring
//! sparse reconstruction and for driving a simulated node.
//!
//! - **Signal patterns**: Linear, Logarithmic, Polynomial, Sigmoid, Sine, Decay
//! - **Noise and dropouts**: Gaussian read noise, failed reads
//! - **Hydroponic presets**: temperature, pH, EC and dissolved oxygen
//!
//! ## Quick Start
//!
//! ```rust
//! use cfe_hydro_testdata::hydroponics::{create_hydroponic_sensors, HydroponicScenario};
//! use cfe_hydro_testdata::{generate_dataset, GeneratorConfig};
//!
//! let config = GeneratorConfig::new()
//!     .with_sample_interval_ms(10_000)
//!     .with_duration_minutes(30.0)
//!     .with_seed(42);
//!
//! let sensors = create_hydroponic_sensors(HydroponicScenario::PhCorrection);
//! let dataset = generate_dataset(&config, &sensors);
//!
//! assert_eq!(dataset.len(), 180);
//! assert_eq!(dataset.ground_truth("ph").len(), 180);
//! ```

pub mod dataset;
pub mod generator;
pub mod hydroponics;
pub mod patterns;

pub use dataset::{Dataset, DatasetError, DatasetRow};
pub use generator::{generate_dataset, ground_truth, GeneratorConfig, SensorConfig, Simulator};
pub use patterns::SignalPattern;
