//! # CFE-HYDRO - Compressive field estimation telemetry
//!
//! A sparse-sampling telemetry protocol for bandwidth-constrained sensor
//! links. The sender transmits a random subset of its high-rate samples,
//! each tagged with the shape its signal is expected to follow; the
//! receiver fits that shape and recovers a dense estimate.
//!
//! ## Key Features
//!
//! - **Uniform random subsampling**: no fixed-interval decimation bias
//! - **Self-describing packets**: descriptor metadata travels with each reading
//! - **Metadata-driven reconstruction**: Linear, Logarithmic, Polynomial or Sigmoidal
//! - **Convergence tracking**: RMSE/R² after every accepted sample
//!
//! ## Quick Start
//!
//! ```rust
//! use cfe_hydro::{ReconstructionHub, ReconstructorConfig, Reading, Sender, SenderConfig,
//!                 SignalRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SignalRegistry::hydroponics());
//! let config = SenderConfig::with_intervals(1_000, 10_000);
//! let mut sender = Sender::new(config, registry, 0).unwrap();
//!
//! // Ten seconds of temperature samples
//! for i in 0..10u64 {
//!     sender.push(Reading::new("temperature", 20.0 + i as f64 * 0.1, i * 1_000)).unwrap();
//! }
//! let output = sender.advance(10_000).unwrap().expect("window closed");
//!
//! // Receiver side
//! let mut hub = ReconstructionHub::new(ReconstructorConfig::default());
//! hub.ingest(&output.bytes).unwrap();
//! let estimate = hub.reconstructor().estimate("temperature", 4_500).unwrap();
//! assert!(estimate >= 20.0 && estimate <= 21.0);
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Readings, interpolation hints and the typed packet
//! - [`registry`]: Static signal descriptors
//! - [`window`]: Transmission windows and the accumulator
//! - [`subsampler`]: Random k-of-n selection per window
//! - [`encoder`] / [`decoder`] / [`wire`]: CFE-HDP JSON codec
//! - [`transport`] / [`session`]: Pub/sub link and reconnecting session
//! - [`reconstruct`]: Per-signal model fitting and estimation
//! - [`metrics`]: Fit quality and convergence
//! - [`hub`]: Receiver pipeline and reporting sinks

// Modules
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod protocol;
pub mod reconstruct;
pub mod recovery;
pub mod registry;
pub mod sender;
pub mod session;
pub mod subsampler;
pub mod transport;
pub mod window;
pub mod wire;

// Re-exports for convenient access
pub use config::{
    DeploymentConfig, FitConfig, ReconstructorConfig, SenderConfig, SessionConfig,
    SparsityPolicy, ValueBounds,
};
pub use decoder::{decode, Decoder};
pub use encoder::{to_bytes, EncodeOutcome, Encoder};
pub use error::{
    CfeError, DecodeError, EncodeError, ReconstructError, Result, SensorError, TransportError,
};
pub use hub::{LogSink, ReconstructionHub, ReportSink};
pub use metrics::{efficiency_score, ConvergencePoint, FitQuality, MetricsTracker};
pub use protocol::{
    InterpolationHint, Packet, Reading, SystemInfo, TimestampMs, TransmittedReading,
    DEFAULT_TOPIC,
};
pub use reconstruct::{
    ApplySummary, Estimator, FitStatus, FittedModel, Forecast, Ingest, ReconstructionState,
    Reconstructor,
};
pub use recovery::ReconnectPolicy;
pub use registry::{SignalDescriptor, SignalRegistry};
pub use sender::{Sender, SenderOutput};
pub use session::{FlushOutcome, SessionState, SessionStats, TransportSession};
pub use subsampler::{SparseSignal, Subsampler};
pub use transport::{
    BrokerLink, LossyLink, MemoryBroker, ScriptedTransport, Transport, TransportMetrics,
    TransportResult,
};
pub use window::{Accumulator, SensorSource, SignalBucket, Window};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let mut descriptors = registry::hydroponics_descriptors();
        descriptors.push(SignalDescriptor::new(
            "nitrate",
            "mg/L",
            "Nitrate uptake",
            (50.0, 150.0),
            InterpolationHint::Sigmoidal,
        ));
        let registry = Arc::new(SignalRegistry::new(descriptors).unwrap());
        let config = SenderConfig {
            sparsity: SparsityPolicy::Ratio(1.0),
            ..SenderConfig::with_intervals(1_000, 5_000)
        };
        let start = 1_741_788_300_000;
        let mut sender = Sender::new(config, registry, start).unwrap();
        sender.set_system_info(SystemInfo {
            free_heap: 180_344,
            wifi_rssi: -61,
            uptime: 5_400,
        });

        let signals = [
            ("temperature", 21.5),
            ("ph", 6.0),
            ("ec", 1.75),
            ("do", 7.25),
            ("nitrate", 80.0),
        ];
        for i in 0..5u64 {
            for (id, base) in signals {
                let value = base + i as f64 * 0.25;
                sender
                    .push(Reading::new(id, value, start + i * 1_000))
                    .unwrap();
            }
        }
        let output = sender.advance(start + 5_000).unwrap().unwrap();
        assert_eq!(output.packet.readings.len(), 25);

        let decoded = decode(&output.bytes).unwrap();
        assert_eq!(decoded, output.packet);
        let hints: Vec<_> = decoded
            .signal_ids()
            .iter()
            .map(|id| decoded.readings_for(id).next().unwrap().interpolation_hint)
            .collect();
        for hint in InterpolationHint::ALL {
            assert!(hints.contains(&hint), "{} missing", hint);
        }
        assert_eq!(decoded.system.wifi_rssi, -61);

        // Same packet with the text timestamp form
        let mut json: serde_json::Value = serde_json::from_slice(&output.bytes).unwrap();
        let text = wire::format_text_timestamp(start + 5_000).unwrap();
        assert_eq!(text, "12/03/2025 14:05:05.000");
        json["transmission_timestamp"] = serde_json::Value::String(text);
        let from_text = decode(&serde_json::to_vec(&json).unwrap()).unwrap();
        assert_eq!(from_text, output.packet);
    }
}
