//! Receiver hub
//!
//! Decodes incoming packets, feeds each signal's reconstruction state and
//! hands finished estimates to a reporting sink. Malformed packets are
//! returned to the caller; they never reach any state.

use crate::config::ReconstructorConfig;
use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::metrics::MetricsTracker;
use crate::protocol::Packet;
use crate::reconstruct::{ApplySummary, Estimator, ReconstructionState, Reconstructor};
use log::info;

/// Consumer of reconstructed signals (plotting, export, dashboards)
pub trait ReportSink {
    /// Receive one signal's estimator and metrics
    fn consume(&mut self, signal_id: &str, estimator: &dyn Estimator, metrics: &MetricsTracker);
}

/// Sink that writes one log line per signal
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn consume(&mut self, signal_id: &str, estimator: &dyn Estimator, metrics: &MetricsTracker) {
        let model = estimator
            .active_model()
            .map_or("none", |m| m.as_str());
        match metrics.latest() {
            Some(q) => info!(
                "{}: model={} samples={} rmse={:.4} r2={}",
                signal_id,
                model,
                q.samples,
                q.rmse,
                q.r2.map_or_else(|| "n/a".to_string(), |r2| format!("{:.4}", r2))
            ),
            None => info!("{}: model={} no samples", signal_id, model),
        }
    }
}

/// Receiver-side pipeline
#[derive(Debug, Clone, Default)]
pub struct ReconstructionHub {
    decoder: Decoder,
    reconstructor: Reconstructor,
}

impl ReconstructionHub {
    /// Create a hub
    pub fn new(config: ReconstructorConfig) -> Self {
        Self {
            decoder: Decoder::new(),
            reconstructor: Reconstructor::new(config),
        }
    }

    /// Decode and apply one packet
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<ApplySummary, DecodeError> {
        let packet = self.decoder.decode(bytes)?;
        Ok(self.ingest_packet(&packet))
    }

    /// Apply an already decoded packet
    pub fn ingest_packet(&mut self, packet: &Packet) -> ApplySummary {
        self.reconstructor.apply_packet(packet)
    }

    /// Per-signal states
    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }

    /// State of one signal
    pub fn state(&self, signal_id: &str) -> Option<&ReconstructionState> {
        self.reconstructor.state(signal_id)
    }

    /// Decode counters
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Hand every signal to a sink
    pub fn report(&self, sink: &mut dyn ReportSink) {
        for state in self.reconstructor.states() {
            sink.consume(state.signal_id(), state, state.metrics());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{to_bytes, Encoder};
    use crate::protocol::{Reading, SystemInfo};
    use crate::registry::SignalRegistry;
    use crate::subsampler::SparseSignal;

    #[derive(Default)]
    struct Collect {
        seen: Vec<(String, Option<f64>)>,
    }

    impl ReportSink for Collect {
        fn consume(&mut self, signal_id: &str, estimator: &dyn Estimator, _: &MetricsTracker) {
            self.seen
                .push((signal_id.to_string(), estimator.estimate(60_000).ok()));
        }
    }

    fn packet_bytes() -> Vec<u8> {
        let registry = SignalRegistry::hydroponics();
        let mut encoder = Encoder::new("d", 10_000, 60_000);
        let sparse = vec![SparseSignal {
            signal_id: "temperature".to_string(),
            readings: vec![
                Reading::new("temperature", 20.0, 0),
                Reading::new("temperature", 22.0, 40_000),
            ],
            available: 6,
        }];
        let outcome = encoder.encode(&sparse, &registry, 60_000, SystemInfo::default());
        to_bytes(&outcome.packet).unwrap()
    }

    #[test]
    fn test_hub_ingest_and_report() {
        let mut hub = ReconstructionHub::new(ReconstructorConfig::default());
        let summary = hub.ingest(&packet_bytes()).unwrap();
        assert_eq!(summary.accepted, 2);

        let mut sink = Collect::default();
        hub.report(&mut sink);
        assert_eq!(sink.seen, vec![("temperature".to_string(), Some(22.0))]);

        LogSink.consume("temperature", hub.state("temperature").unwrap(), &MetricsTracker::new());
    }

    #[test]
    fn test_hub_surfaces_malformed() {
        let mut hub = ReconstructionHub::new(ReconstructorConfig::default());
        let err = hub.ingest(br#"{"device_id": 5}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPacket { .. }));
        assert!(hub.reconstructor().is_empty());
        assert_eq!(hub.decoder().rejected(), 1);
    }
}
