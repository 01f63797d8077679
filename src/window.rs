//! Transmission windows and the sender-side accumulator
//!
//! A [`Window`] collects every reading sampled during one
//! `transmission_interval`, grouped by signal. The [`Accumulator`] owns the
//! open window exclusively; when the interval elapses the window is handed
//! out by value and a fresh one is opened, so nothing else ever mutates a
//! window that is being filled.

use crate::error::SensorError;
use crate::protocol::{Reading, TimestampMs};
use crate::registry::SignalRegistry;
use log::{debug, warn};

/// Sensor collaborator: one synchronous read per signal
pub trait SensorSource {
    /// Read the current value of a signal
    fn read(&mut self, signal_id: &str) -> std::result::Result<f64, SensorError>;
}

/// Readings of one signal within a window
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBucket {
    /// Signal identifier
    pub signal_id: String,
    /// Readings in arrival order
    pub readings: Vec<Reading>,
    /// First sensor fault seen in this window, if any
    pub fault: Option<SensorError>,
}

impl SignalBucket {
    fn new(signal_id: &str) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            readings: Vec::new(),
            fault: None,
        }
    }

    /// Readings eligible for transmission; a faulted signal yields none
    pub fn usable(&self) -> &[Reading] {
        if self.fault.is_some() {
            &[]
        } else {
            &self.readings
        }
    }
}

/// One accumulation window
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    sequence: u64,
    opened_at: TimestampMs,
    length_ms: u64,
    buckets: Vec<SignalBucket>,
}

impl Window {
    /// Open an empty window
    pub fn new(sequence: u64, opened_at: TimestampMs, length_ms: u64) -> Self {
        Self {
            sequence,
            opened_at,
            length_ms,
            buckets: Vec::new(),
        }
    }

    /// Position of this window since the accumulator started
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Start of the window (inclusive)
    pub fn opened_at(&self) -> TimestampMs {
        self.opened_at
    }

    /// End of the window (exclusive)
    pub fn closes_at(&self) -> TimestampMs {
        self.opened_at.saturating_add(self.length_ms)
    }

    /// Whether `t` falls inside the window
    pub fn contains(&self, t: TimestampMs) -> bool {
        t >= self.opened_at && t < self.closes_at()
    }

    fn bucket_mut(&mut self, signal_id: &str) -> &mut SignalBucket {
        let pos = match self.buckets.iter().position(|b| b.signal_id == signal_id) {
            Some(pos) => pos,
            None => {
                self.buckets.push(SignalBucket::new(signal_id));
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[pos]
    }

    /// Add a reading
    pub fn push(&mut self, reading: Reading) {
        let bucket = self.bucket_mut(&reading.signal_id);
        bucket.readings.push(reading);
    }

    /// Record a sensor fault; the signal is skipped for the whole window
    pub fn record_fault(&mut self, fault: SensorError) {
        let SensorError::SensorFault { signal_id, .. } = &fault;
        let bucket = self.bucket_mut(signal_id);
        if bucket.fault.is_none() {
            bucket.fault = Some(fault);
        }
    }

    /// Per-signal buckets in first-seen order
    pub fn buckets(&self) -> &[SignalBucket] {
        &self.buckets
    }

    /// Bucket for one signal
    pub fn bucket(&self, signal_id: &str) -> Option<&SignalBucket> {
        self.buckets.iter().find(|b| b.signal_id == signal_id)
    }

    /// Total readings held, faulted signals included
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.readings.len()).sum()
    }

    /// Whether no reading was accumulated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner of the open window
#[derive(Debug)]
pub struct Accumulator {
    window: Window,
    transmission_interval_ms: u64,
    windows_closed: u64,
}

impl Accumulator {
    /// Start accumulating at `start`
    pub fn new(start: TimestampMs, transmission_interval_ms: u64) -> Self {
        let length = transmission_interval_ms.max(1);
        Self {
            window: Window::new(0, start, length),
            transmission_interval_ms: length,
            windows_closed: 0,
        }
    }

    /// The window currently being filled
    pub fn current(&self) -> &Window {
        &self.window
    }

    /// Number of windows handed out so far
    pub fn windows_closed(&self) -> u64 {
        self.windows_closed
    }

    /// Close the open window if `now` has reached its end
    ///
    /// The next window starts on the boundary that contains `now`, so a long
    /// stall yields one closed window rather than a burst of empty ones.
    pub fn advance(&mut self, now: TimestampMs) -> Option<Window> {
        let closes_at = self.window.closes_at();
        if now < closes_at {
            return None;
        }
        let skipped = (now - closes_at) / self.transmission_interval_ms;
        let next_open = closes_at + skipped * self.transmission_interval_ms;
        let next = Window::new(
            self.window.sequence + 1,
            next_open,
            self.transmission_interval_ms,
        );
        let closed = std::mem::replace(&mut self.window, next);
        self.windows_closed += 1;
        debug!(
            "window #{} closed with {} readings across {} signals",
            closed.sequence,
            closed.len(),
            closed.buckets.len()
        );
        Some(closed)
    }

    /// Add one reading, closing the window first if the reading belongs to
    /// a later one
    pub fn push(&mut self, reading: Reading) -> Option<Window> {
        let closed = self.advance(reading.sample_time);
        if reading.sample_time < self.window.opened_at {
            warn!(
                "reading for {} at {} predates the open window, discarded",
                reading.signal_id, reading.sample_time
            );
            return closed;
        }
        self.window.push(reading);
        closed
    }

    /// Sample every registered signal once at `now`
    ///
    /// A failed read marks the signal as faulted for the current window;
    /// no substitute value is recorded.
    pub fn sample_all<S: SensorSource + ?Sized>(
        &mut self,
        source: &mut S,
        registry: &SignalRegistry,
        now: TimestampMs,
    ) -> Option<Window> {
        let closed = self.advance(now);
        for descriptor in registry.iter() {
            match source.read(&descriptor.signal_id) {
                Ok(value) => self
                    .window
                    .push(Reading::new(descriptor.signal_id.as_str(), value, now)),
                Err(fault) => {
                    warn!("{}; skipping signal for this window", fault);
                    self.window.record_fault(fault);
                }
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakySource {
        calls: u32,
    }

    impl SensorSource for FlakySource {
        fn read(&mut self, signal_id: &str) -> std::result::Result<f64, SensorError> {
            self.calls += 1;
            if signal_id == "ph" && self.calls % 8 == 2 {
                return Err(SensorError::SensorFault {
                    signal_id: signal_id.to_string(),
                    reason: "probe disconnected".to_string(),
                });
            }
            Ok(self.calls as f64)
        }
    }

    #[test]
    fn test_window_boundaries() {
        let window = Window::new(0, 1_000, 500);
        assert!(window.contains(1_000));
        assert!(window.contains(1_499));
        assert!(!window.contains(1_500));
        assert_eq!(window.closes_at(), 1_500);
    }

    #[test]
    fn test_accumulator_closes_on_boundary() {
        let mut acc = Accumulator::new(0, 1_000);
        assert!(acc.push(Reading::new("ec", 1.0, 0)).is_none());
        assert!(acc.push(Reading::new("ec", 1.1, 999)).is_none());

        let closed = acc.push(Reading::new("ec", 1.2, 1_000)).unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.sequence(), 0);
        assert_eq!(acc.current().len(), 1);
        assert_eq!(acc.current().opened_at(), 1_000);
        assert_eq!(acc.windows_closed(), 1);
    }

    #[test]
    fn test_accumulator_realigns_after_stall() {
        let mut acc = Accumulator::new(0, 1_000);
        acc.push(Reading::new("ec", 1.0, 10));
        let closed = acc.advance(5_250).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(acc.current().opened_at(), 5_000);
        assert!(acc.advance(5_999).is_none());
    }

    #[test]
    fn test_sensor_fault_skips_signal_for_window() {
        let registry = SignalRegistry::hydroponics();
        let mut source = FlakySource { calls: 0 };
        let mut acc = Accumulator::new(0, 10_000);

        for step in 0..5 {
            acc.sample_all(&mut source, &registry, step * 1_000);
        }
        let closed = acc.advance(10_000).unwrap();

        let ph = closed.bucket("ph").unwrap();
        assert!(ph.fault.is_some());
        assert!(ph.usable().is_empty());

        let temperature = closed.bucket("temperature").unwrap();
        assert_eq!(temperature.usable().len(), 5);
    }
}
