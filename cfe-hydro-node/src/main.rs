// CFE-HYDRO Node - Simulated sender/receiver node
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! # CFE-HYDRO Node
//!
//! ## Usage
//!
//! ```bash
//! # Simulated pH correction, one hour of node time at 60x
//! cfe-hydro-node simulate --scenario ph-correction --duration-secs 3600 --speed 60
//!
//! # Replay a recorded CSV over a lossy link and export the reconstruction
//! cfe-hydro-node replay --csv bed.csv --loss-rate 0.2 --export recon.csv
//! ```

use cfe_hydro::{DeploymentConfig, LogSink, LossyLink, MemoryBroker, ReportSink};
use cfe_hydro_node::{
    export_reconstruction, run_node, server, CsvReplaySensor, NodeConfig, NodeError, NodeReport,
    NodeResult, NodeSensor, SimulatedSensor,
};
use cfe_hydro_testdata::hydroponics::{create_hydroponic_sensors, HydroponicScenario};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Synthetic hydroponic sensors
    Simulate,
    /// Readings from a CSV file
    Replay,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Stable,
    PhCorrection,
    NutrientDosing,
    AerationFailure,
}

impl From<Scenario> for HydroponicScenario {
    fn from(s: Scenario) -> Self {
        match s {
            Scenario::Stable => HydroponicScenario::Stable,
            Scenario::PhCorrection => HydroponicScenario::PhCorrection,
            Scenario::NutrientDosing => HydroponicScenario::NutrientDosing,
            Scenario::AerationFailure => HydroponicScenario::AerationFailure,
        }
    }
}

/// CFE-HYDRO simulated node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sensor source
    #[arg(value_enum)]
    mode: Mode,

    /// Deployment configuration (JSON); hydroponic defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulation scenario
    #[arg(long, value_enum, default_value = "stable")]
    scenario: Scenario,

    /// CSV file to replay
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Node time to run, in seconds
    #[arg(short, long, default_value = "600")]
    duration_secs: u64,

    /// Node time per unit of wall time
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Fraction of publishes the uplink loses
    #[arg(long, default_value = "0.0")]
    loss_rate: f32,

    /// Seed for sensors, subsampling and link loss
    #[arg(long)]
    seed: Option<u64>,

    /// Port for /metrics and /health
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Write the reconstructed series to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Grid step of the export, in milliseconds
    #[arg(long, default_value = "1000")]
    export_step_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_deployment(path: Option<&PathBuf>) -> NodeResult<DeploymentConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(DeploymentConfig::from_json(&text)?)
        }
        None => Ok(DeploymentConfig::default()),
    }
}

async fn run_with<S: NodeSensor + 'static>(
    args: &Args,
    config: NodeConfig,
    sensor: S,
) -> NodeResult<NodeReport> {
    let broker = MemoryBroker::new();
    let downlink = broker.subscribe(&config.topic);
    let uplink = match args.seed {
        Some(seed) => LossyLink::with_seed(broker.link(), args.loss_rate, seed),
        None => LossyLink::new(broker.link(), args.loss_rate),
    };
    let run_for = Duration::from_secs_f64(args.duration_secs as f64 / config.speed);
    run_node(&config, sensor, uplink, downlink, run_for).await
}

async fn run(args: Args) -> NodeResult<()> {
    if !(0.0..=1.0).contains(&args.loss_rate) {
        return Err(NodeError::InvalidOption(format!(
            "loss rate {} outside [0, 1]",
            args.loss_rate
        )));
    }

    let config = NodeConfig {
        deployment: load_deployment(args.config.as_ref())?,
        speed: args.speed,
        subsample_seed: args.seed,
        ..NodeConfig::default()
    };
    config.validate()?;

    let port = args.port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(port).await {
            error!("HTTP server stopped: {}", e);
        }
    });

    let report = match args.mode {
        Mode::Simulate => {
            let sensors = create_hydroponic_sensors(args.scenario.into());
            let sensor = SimulatedSensor::new(sensors, 0, args.seed);
            run_with(&args, config, sensor).await?
        }
        Mode::Replay => {
            let path = args.csv.as_ref().ok_or_else(|| {
                NodeError::InvalidOption("replay mode needs --csv".to_string())
            })?;
            let interval = config.deployment.sender.sampling_interval_ms;
            let sensor = CsvReplaySensor::from_path(path, interval)?;
            run_with(&args, config, sensor).await?
        }
    };

    info!(
        "{} windows closed, {} packets published, {} failed, {} stale",
        report.windows_closed,
        report.publisher.published,
        report.publisher.failed,
        report.publisher.dropped_stale + report.mailbox_stale
    );
    let mut sink = LogSink;
    for state in &report.receiver.states {
        sink.consume(state.signal_id(), state, state.metrics());
    }

    if let Some(path) = &args.export {
        export_reconstruction(
            path,
            &report.receiver.states,
            Duration::from_millis(args.export_step_ms),
        )?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);
    info!("CFE-HYDRO Node v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
