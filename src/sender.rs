//! Sender pipeline
//!
//! Sampling, windowing, subsampling and encoding on one cooperative loop.
//! The sender produces encoded packets and never touches the transport, so
//! accumulation keeps running whatever state the session is in.

use crate::config::SenderConfig;
use crate::encoder::{to_bytes, Encoder};
use crate::error::{EncodeError, Result};
use crate::protocol::{Packet, Reading, SystemInfo, TimestampMs};
use crate::registry::SignalRegistry;
use crate::subsampler::Subsampler;
use crate::window::{Accumulator, SensorSource, Window};
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;

/// One encoded window
#[derive(Debug, Clone, PartialEq)]
pub struct SenderOutput {
    /// Sequence number of the window the packet was built from
    pub window_sequence: u64,
    /// Typed packet
    pub packet: Packet,
    /// JSON bytes ready to publish
    pub bytes: Vec<u8>,
    /// Readings dropped while encoding
    pub dropped: Vec<EncodeError>,
}

/// Sender-side pipeline for one device
#[derive(Debug)]
pub struct Sender<R: Rng = StdRng> {
    config: SenderConfig,
    registry: Arc<SignalRegistry>,
    accumulator: Accumulator,
    subsampler: Subsampler<R>,
    encoder: Encoder,
    system: SystemInfo,
}

impl Sender<StdRng> {
    /// Create a sender whose first window opens at `start`
    pub fn new(config: SenderConfig, registry: Arc<SignalRegistry>, start: TimestampMs) -> Result<Self> {
        let subsampler = Subsampler::new(config.sparsity);
        Self::with_subsampler(config, registry, start, subsampler)
    }
}

impl<R: Rng> Sender<R> {
    /// Create a sender with a caller-supplied subsampler
    pub fn with_subsampler(
        config: SenderConfig,
        registry: Arc<SignalRegistry>,
        start: TimestampMs,
        subsampler: Subsampler<R>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            accumulator: Accumulator::new(start, config.transmission_interval_ms),
            encoder: Encoder::from_config(&config),
            subsampler,
            registry,
            config,
            system: SystemInfo::default(),
        })
    }

    /// Sender configuration
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Signal registry
    pub fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    /// Windows closed so far, whatever happened to their packets
    pub fn windows_closed(&self) -> u64 {
        self.accumulator.windows_closed()
    }

    /// Window being filled
    pub fn current_window(&self) -> &Window {
        self.accumulator.current()
    }

    /// Diagnostics placed in the next packets
    pub fn set_system_info(&mut self, system: SystemInfo) {
        self.system = system;
    }

    /// Sample every signal once at `now`
    ///
    /// Returns the encoded packet of the window that `now` closed, if any.
    pub fn sample<S: SensorSource + ?Sized>(
        &mut self,
        source: &mut S,
        now: TimestampMs,
    ) -> Result<Option<SenderOutput>> {
        match self.accumulator.sample_all(source, &self.registry, now) {
            Some(window) => self.close_window(window, now).map(Some),
            None => Ok(None),
        }
    }

    /// Accept one externally timed reading
    pub fn push(&mut self, reading: Reading) -> Result<Option<SenderOutput>> {
        let now = reading.sample_time;
        match self.accumulator.push(reading) {
            Some(window) => self.close_window(window, now).map(Some),
            None => Ok(None),
        }
    }

    /// Close the open window if its interval has elapsed at `now`
    pub fn advance(&mut self, now: TimestampMs) -> Result<Option<SenderOutput>> {
        match self.accumulator.advance(now) {
            Some(window) => self.close_window(window, now).map(Some),
            None => Ok(None),
        }
    }

    /// Subsample and encode a closed window
    ///
    /// The window is consumed; nothing else can observe it afterwards.
    pub fn close_window(&mut self, window: Window, now: TimestampMs) -> Result<SenderOutput> {
        let sparse = self.subsampler.subsample(&window);
        let outcome = self.encoder.encode(&sparse, &self.registry, now, self.system);
        let bytes = to_bytes(&outcome.packet)?;
        debug!(
            "window #{}: {} of {} readings encoded into {} bytes",
            window.sequence(),
            outcome.packet.readings.len(),
            window.len(),
            bytes.len()
        );
        Ok(SenderOutput {
            window_sequence: window.sequence(),
            packet: outcome.packet,
            bytes,
            dropped: outcome.dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SparsityPolicy;
    use crate::error::SensorError;

    struct RampSource {
        step: f64,
    }

    impl SensorSource for RampSource {
        fn read(&mut self, signal_id: &str) -> std::result::Result<f64, SensorError> {
            self.step += 1.0;
            match signal_id {
                "ec" => Err(SensorError::SensorFault {
                    signal_id: signal_id.to_string(),
                    reason: "probe dry".to_string(),
                }),
                _ => Ok(self.step),
            }
        }
    }

    fn sender(ratio: f64) -> Sender {
        let config = SenderConfig {
            sampling_interval_ms: 1_000,
            transmission_interval_ms: 9_000,
            sparsity: SparsityPolicy::Ratio(ratio),
            ..Default::default()
        };
        let subsampler = Subsampler::seeded(config.sparsity, 11);
        Sender::with_subsampler(config, Arc::new(SignalRegistry::hydroponics()), 0, subsampler)
            .unwrap()
    }

    #[test]
    fn test_sample_loop_emits_one_packet_per_window() {
        let mut sender = sender(1.0 / 3.0);
        let mut source = RampSource { step: 0.0 };
        let mut outputs = Vec::new();

        for s in 0..27u64 {
            if let Some(out) = sender.sample(&mut source, s * 1_000).unwrap() {
                outputs.push(out);
            }
        }

        assert_eq!(outputs.len(), 2);
        assert_eq!(sender.windows_closed(), 2);
        let first = &outputs[0];
        assert_eq!(first.window_sequence, 0);
        // 9 samples per signal, k = 3; "ec" faulted and omitted
        assert_eq!(first.packet.signal_ids(), vec!["temperature", "ph", "do"]);
        assert_eq!(first.packet.readings_for("ph").count(), 3);
        for r in &first.packet.readings {
            assert!(r.sample_time < 9_000);
        }
    }

    #[test]
    fn test_sender_rejects_bad_config() {
        let config = SenderConfig::with_intervals(10_000, 1_000);
        assert!(Sender::new(config, Arc::new(SignalRegistry::hydroponics()), 0).is_err());
    }

    #[test]
    fn test_push_and_advance() {
        let mut sender = sender(1.0);
        assert!(sender.push(Reading::new("ph", 6.0, 100)).unwrap().is_none());
        assert!(sender.push(Reading::new("orp", 200.0, 200)).unwrap().is_none());

        let out = sender.advance(9_000).unwrap().unwrap();
        assert_eq!(out.packet.readings.len(), 1);
        assert_eq!(out.dropped.len(), 1);
        assert_eq!(out.packet.transmission_timestamp, 9_000);
        assert!(sender.advance(9_500).unwrap().is_none());
    }
}
