//! Receiver-side reconstruction
//!
//! Each signal gets one [`ReconstructionState`], created lazily on its
//! first reading. The state keeps every accepted sample sorted by time,
//! refits the hinted model after each change and records how well the
//! previous fit predicted each new sample.
//! Until the hinted model has enough samples, or if its fit fails, the
//! state falls back to Linear and reports why in its [`FitStatus`].
//!
//! Internally time is seconds relative to the earliest accepted sample.

mod fit;
mod models;

pub use fit::{linear_interpolate, LogFit, PolyFit, SigmoidFit};
pub use models::FittedModel;

use crate::config::{FitConfig, ReconstructorConfig, ValueBounds};
use crate::error::ReconstructError;
use crate::metrics::MetricsTracker;
use crate::protocol::{InterpolationHint, Packet, TimestampMs, TransmittedReading};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;

/// Anything that can produce an estimate for a point in time
pub trait Estimator {
    /// Estimated value at `t` (epoch ms)
    fn estimate(&self, t: TimestampMs) -> Result<f64, ReconstructError>;

    /// Model currently answering estimates, if any
    fn active_model(&self) -> Option<InterpolationHint>;
}

/// Outcome of the last refit
#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    /// No samples yet
    Empty,
    /// The hinted model is in use
    Fitted,
    /// Linear fallback in use, with the reason
    Fallback(ReconstructError),
}

/// What happened to an offered sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Later than every accepted sample
    Appended,
    /// Arrived out of order and was inserted in time order
    Inserted,
    /// A sample with the same timestamp was already accepted
    Duplicate,
    /// Not a finite value
    Rejected,
}

impl Ingest {
    /// Whether the sample joined the history
    pub fn accepted(&self) -> bool {
        matches!(self, Ingest::Appended | Ingest::Inserted)
    }
}

/// Descriptor data carried by the latest reading of a signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMeta {
    pub unit: String,
    pub description: String,
    pub optimal_min: f64,
    pub optimal_max: f64,
}

/// A forecast and its confidence bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    /// Forecast instant (epoch ms)
    pub time: TimestampMs,
    /// Estimated value
    pub value: f64,
    /// Last RMSE, if one has been computed
    pub error_bound: Option<f64>,
}

/// Accumulated samples and fitted model for one signal
#[derive(Debug, Clone)]
pub struct ReconstructionState {
    signal_id: String,
    hint: InterpolationHint,
    meta: Option<SignalMeta>,
    times: Vec<TimestampMs>,
    values: Vec<f64>,
    /// `times` in seconds relative to `times[0]`
    xs: Vec<f64>,
    model: FittedModel,
    status: FitStatus,
    metrics: MetricsTracker,
    polynomial_degree: usize,
    fit: FitConfig,
    bounds: Option<ValueBounds>,
}

impl ReconstructionState {
    /// Create an empty state
    pub fn new(signal_id: impl Into<String>, hint: InterpolationHint, config: &ReconstructorConfig) -> Self {
        let signal_id = signal_id.into();
        let bounds = config.bounds.get(&signal_id).copied();
        Self {
            signal_id,
            hint,
            meta: None,
            times: Vec::new(),
            values: Vec::new(),
            xs: Vec::new(),
            model: FittedModel::Linear,
            status: FitStatus::Empty,
            metrics: MetricsTracker::new(),
            polynomial_degree: config.polynomial_degree,
            fit: config.fit,
            bounds,
        }
    }

    /// Signal identifier
    pub fn signal_id(&self) -> &str {
        &self.signal_id
    }

    /// Model requested by the sender
    pub fn hint(&self) -> InterpolationHint {
        self.hint
    }

    /// Outcome of the last refit
    pub fn status(&self) -> &FitStatus {
        &self.status
    }

    /// Fitted model
    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    /// Fit metrics
    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    /// Descriptor data from the latest reading
    pub fn meta(&self) -> Option<&SignalMeta> {
        self.meta.as_ref()
    }

    /// Number of accepted samples
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Whether no sample was accepted
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Accepted samples in time order
    pub fn samples(&self) -> impl Iterator<Item = (TimestampMs, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    /// Earliest and latest sample times
    pub fn time_range(&self) -> Option<(TimestampMs, TimestampMs)> {
        Some((*self.times.first()?, *self.times.last()?))
    }

    /// Apply one transmitted reading
    ///
    /// The reading's hint and metadata replace the stored ones; a hint
    /// change triggers a refit even when the sample itself is a duplicate.
    pub fn apply(&mut self, reading: &TransmittedReading) -> Ingest {
        self.meta = Some(SignalMeta {
            unit: reading.unit.clone(),
            description: reading.description.clone(),
            optimal_min: reading.optimal_min,
            optimal_max: reading.optimal_max,
        });
        let hint_changed = reading.interpolation_hint != self.hint;
        if hint_changed {
            debug!(
                "{}: interpolation hint {} -> {}",
                self.signal_id, self.hint, reading.interpolation_hint
            );
            self.hint = reading.interpolation_hint;
        }
        let outcome = self.insert(reading.sample_time, reading.value);
        if hint_changed && !outcome.accepted() && !self.is_empty() {
            self.refit();
        }
        outcome
    }

    /// Offer one sample
    ///
    /// Duplicate timestamps are rejected; out-of-order samples are placed
    /// in time order and the model is refitted over the full sorted set.
    /// The sample is first predicted by the current fit and that error
    /// goes to the metrics.
    pub fn insert(&mut self, time: TimestampMs, value: f64) -> Ingest {
        if !value.is_finite() {
            warn!("{}: ignoring non-finite sample at {}", self.signal_id, time);
            return Ingest::Rejected;
        }
        let fitted_on = self.times.len();
        let predicted = self.estimate(time).ok();
        let outcome = match self.times.binary_search(&time) {
            Ok(_) => {
                debug!("{}: duplicate sample at {}", self.signal_id, time);
                return Ingest::Duplicate;
            }
            Err(pos) if pos == self.times.len() => {
                self.times.push(time);
                self.values.push(value);
                Ingest::Appended
            }
            Err(pos) => {
                self.times.insert(pos, time);
                self.values.insert(pos, value);
                Ingest::Inserted
            }
        };
        self.refit();
        if let Some(predicted) = predicted {
            self.metrics.record(fitted_on, value, predicted);
        }
        outcome
    }

    fn refit(&mut self) {
        let origin = self.times[0];
        self.xs = self.times.iter().map(|&t| secs_between(origin, t)).collect();

        let needed = self.hint.min_samples(self.polynomial_degree);
        let available = self.times.len();
        let result = if available < needed {
            Err(ReconstructError::InsufficientSamples {
                model: self.hint.as_str(),
                needed,
                available,
            })
        } else {
            FittedModel::fit(
                self.hint,
                &self.xs,
                &self.values,
                self.polynomial_degree,
                &self.fit,
                Some(&self.model),
            )
        };

        match result {
            Ok(model) => {
                self.model = model;
                self.status = FitStatus::Fitted;
            }
            Err(reason) => {
                if matches!(reason, ReconstructError::FitDiverged { .. }) {
                    warn!("{}: {}; using linear fallback", self.signal_id, reason);
                }
                self.model = FittedModel::Linear;
                self.status = FitStatus::Fallback(reason);
            }
        }
        debug!(
            "{}: refit {} over {} samples ({:?})",
            self.signal_id,
            self.model.kind(),
            available,
            self.status
        );
    }

    fn eval_secs(&self, x: f64) -> f64 {
        let value = self.model.eval(&self.xs, &self.values, x);
        match self.bounds {
            Some(bounds) => bounds.apply(value),
            None => value,
        }
    }

    /// Estimated value at `t`; beyond the latest sample this is a forecast
    pub fn estimate(&self, t: TimestampMs) -> Result<f64, ReconstructError> {
        let origin = *self.times.first().ok_or_else(|| ReconstructError::NoData {
            signal_id: self.signal_id.clone(),
        })?;
        Ok(self.eval_secs(secs_between(origin, t)))
    }

    /// Dense series from `start` to `end` inclusive every `step`
    ///
    /// A zero step yields only `start`.
    pub fn resample(
        &self,
        start: TimestampMs,
        end: TimestampMs,
        step: Duration,
    ) -> Result<Vec<(TimestampMs, f64)>, ReconstructError> {
        let step_ms = step.as_millis() as u64;
        let mut series = Vec::new();
        let mut t = start;
        loop {
            series.push((t, self.estimate(t)?));
            if step_ms == 0 {
                break;
            }
            match t.checked_add(step_ms) {
                Some(next) if next <= end => t = next,
                _ => break,
            }
        }
        Ok(series)
    }

    /// Estimate `horizon` past the latest sample, with the current error
    /// bound
    pub fn forecast(&self, horizon: Duration) -> Result<Forecast, ReconstructError> {
        let last = *self.times.last().ok_or_else(|| ReconstructError::NoData {
            signal_id: self.signal_id.clone(),
        })?;
        let time = last.saturating_add(horizon.as_millis() as u64);
        Ok(Forecast {
            time,
            value: self.estimate(time)?,
            error_bound: self.metrics.forecast_error(horizon),
        })
    }
}

impl Estimator for ReconstructionState {
    fn estimate(&self, t: TimestampMs) -> Result<f64, ReconstructError> {
        ReconstructionState::estimate(self, t)
    }

    fn active_model(&self) -> Option<InterpolationHint> {
        (!self.is_empty()).then(|| self.model.kind())
    }
}

fn secs_between(origin: TimestampMs, t: TimestampMs) -> f64 {
    (t as f64 - origin as f64) / 1000.0
}

/// Result of applying one packet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplySummary {
    /// Samples added to a history
    pub accepted: usize,
    /// Samples whose timestamp was already present
    pub duplicates: usize,
    /// Samples rejected as non-finite
    pub rejected: usize,
    /// Signals that received at least one reading, in first-seen order
    pub signals: Vec<String>,
}

/// Reconstruction states for every signal seen
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    config: ReconstructorConfig,
    states: BTreeMap<String, ReconstructionState>,
}

impl Reconstructor {
    /// Create an empty reconstructor
    pub fn new(config: ReconstructorConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
        }
    }

    /// Reconstruction configuration
    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Apply one reading, creating the signal's state on first sight
    pub fn apply(&mut self, reading: &TransmittedReading) -> Ingest {
        let config = &self.config;
        self.states
            .entry(reading.signal_id.clone())
            .or_insert_with(|| {
                ReconstructionState::new(reading.signal_id.as_str(), reading.interpolation_hint, config)
            })
            .apply(reading)
    }

    /// Apply every reading of a packet
    pub fn apply_packet(&mut self, packet: &Packet) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for reading in &packet.readings {
            match self.apply(reading) {
                Ingest::Appended | Ingest::Inserted => summary.accepted += 1,
                Ingest::Duplicate => summary.duplicates += 1,
                Ingest::Rejected => summary.rejected += 1,
            }
            if !summary.signals.contains(&reading.signal_id) {
                summary.signals.push(reading.signal_id.clone());
            }
        }
        summary
    }

    /// State of one signal
    pub fn state(&self, signal_id: &str) -> Option<&ReconstructionState> {
        self.states.get(signal_id)
    }

    /// All states, ordered by signal id
    pub fn states(&self) -> impl Iterator<Item = &ReconstructionState> {
        self.states.values()
    }

    /// Number of signals seen
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no signal has been seen
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Estimate one signal at `t`; an unseen signal has no data
    pub fn estimate(&self, signal_id: &str, t: TimestampMs) -> Result<f64, ReconstructError> {
        self.state(signal_id)
            .ok_or_else(|| ReconstructError::NoData {
                signal_id: signal_id.to_string(),
            })?
            .estimate(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reading(id: &str, hint: InterpolationHint, value: f64, t: TimestampMs) -> TransmittedReading {
        TransmittedReading {
            signal_id: id.to_string(),
            value,
            sample_time: t,
            interpolation_hint: hint,
            unit: "pH".to_string(),
            description: String::new(),
            optimal_min: 5.5,
            optimal_max: 7.0,
        }
    }

    #[test]
    fn test_ph_logarithmic_forecast_scenario() {
        let mut state = ReconstructionState::new(
            "ph",
            InterpolationHint::Logarithmic,
            &ReconstructorConfig::default(),
        );
        state.insert(0, 6.0);
        state.insert(60_000, 6.3);
        state.insert(120_000, 6.45);

        assert_eq!(state.status(), &FitStatus::Fitted);
        let v = state.estimate(180_000).unwrap();
        assert!(v > 6.45 && v < 7.0, "estimate {} outside (6.45, 7.0)", v);
    }

    #[test]
    fn test_linear_passes_through_samples() {
        let mut state =
            ReconstructionState::new("t", InterpolationHint::Linear, &ReconstructorConfig::default());
        let samples = [(1_000, 20.5), (4_000, 21.0), (9_000, 19.75), (12_000, 22.125)];
        for (t, v) in samples {
            state.insert(t, v);
        }
        for (t, v) in samples {
            assert_relative_eq!(state.estimate(t).unwrap(), v, epsilon = 1e-12);
        }
        // Past the last sample the linear fit holds its value
        assert_eq!(state.metrics().history().len(), 3);
        assert_eq!(state.metrics().history()[0].sample_count, 1);
        assert_relative_eq!(
            state.metrics().rmse().unwrap(),
            ((0.25f64 + 1.5625 + 5.640625) / 3.0).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_no_data_before_first_sample() {
        let state =
            ReconstructionState::new("ec", InterpolationHint::Polynomial, &ReconstructorConfig::default());
        assert_eq!(
            state.estimate(0),
            Err(ReconstructError::NoData {
                signal_id: "ec".to_string()
            })
        );
        assert!(state.forecast(Duration::from_secs(60)).is_err());
        assert_eq!(state.active_model(), None);
    }

    #[test]
    fn test_insufficient_samples_falls_back_to_linear() {
        let mut state = ReconstructionState::new(
            "do",
            InterpolationHint::Sigmoidal,
            &ReconstructorConfig::default(),
        );
        state.insert(0, 6.0);
        assert_eq!(state.estimate(50_000).unwrap(), 6.0);
        assert!(matches!(
            state.status(),
            FitStatus::Fallback(ReconstructError::InsufficientSamples { needed: 3, available: 1, .. })
        ));

        state.insert(10_000, 7.0);
        assert_eq!(state.active_model(), Some(InterpolationHint::Linear));
        assert_relative_eq!(state.estimate(5_000).unwrap(), 6.5);
    }

    #[test]
    fn test_duplicates_and_out_of_order() {
        let mut state =
            ReconstructionState::new("t", InterpolationHint::Linear, &ReconstructorConfig::default());
        assert_eq!(state.insert(10_000, 1.0), Ingest::Appended);
        assert_eq!(state.insert(30_000, 3.0), Ingest::Appended);
        assert_eq!(state.insert(10_000, 9.0), Ingest::Duplicate);
        assert_eq!(state.insert(20_000, 5.0), Ingest::Inserted);
        assert_eq!(state.insert(0, 0.0), Ingest::Inserted);
        assert_eq!(state.insert(40_000, f64::NAN), Ingest::Rejected);

        let times: Vec<_> = state.samples().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0, 10_000, 20_000, 30_000]);
        assert_eq!(state.estimate(20_000).unwrap(), 5.0);
        assert_eq!(state.estimate(10_000).unwrap(), 1.0);
    }

    #[test]
    fn test_bounds_clamp_estimates() {
        let mut state = ReconstructionState::new(
            "ph",
            InterpolationHint::Polynomial,
            &ReconstructorConfig::hydroponics(),
        );
        // Steep quadratic that overshoots 14 when extrapolated
        for (i, v) in [6.0, 8.0, 12.0].iter().enumerate() {
            state.insert(i as u64 * 60_000, *v);
        }
        assert_eq!(state.estimate(600_000).unwrap(), 14.0);
    }

    #[test]
    fn test_resample_and_forecast() {
        let mut state =
            ReconstructionState::new("t", InterpolationHint::Linear, &ReconstructorConfig::default());
        state.insert(0, 0.0);
        state.insert(10_000, 10.0);

        let series = state.resample(0, 10_000, Duration::from_secs(2)).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series[3], (6_000, 6.0));
        assert_eq!(state.resample(0, 10_000, Duration::ZERO).unwrap().len(), 1);

        let forecast = state.forecast(Duration::from_secs(30)).unwrap();
        assert_eq!(forecast.time, 40_000);
        assert_eq!(forecast.value, 10.0);
        // 0.0 was held when 10.0 arrived
        assert_eq!(forecast.error_bound, Some(10.0));
    }

    #[test]
    fn test_reconstructor_lazily_creates_states() {
        let mut recon = Reconstructor::new(ReconstructorConfig::default());
        assert!(recon.estimate("ph", 0).is_err());

        let packet = Packet {
            device_id: "d".to_string(),
            transmission_timestamp: 0,
            sampling_interval: 1_000,
            transmission_interval: 60_000,
            readings: vec![
                reading("ph", InterpolationHint::Logarithmic, 6.0, 0),
                reading("ec", InterpolationHint::Polynomial, 1.2, 0),
                reading("ph", InterpolationHint::Logarithmic, 6.1, 30_000),
                reading("ph", InterpolationHint::Logarithmic, 6.1, 30_000),
            ],
            system: Default::default(),
        };
        let summary = recon.apply_packet(&packet);
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.signals, vec!["ph", "ec"]);
        assert_eq!(recon.len(), 2);
        assert_eq!(recon.state("ph").unwrap().len(), 2);
        assert_eq!(recon.state("ph").unwrap().meta().unwrap().unit, "pH");
    }

    #[test]
    fn test_hint_change_refits() {
        let mut state =
            ReconstructionState::new("ec", InterpolationHint::Linear, &ReconstructorConfig::default());
        for (t, v) in [(0, 1.0), (10_000, 2.0), (20_000, 2.5)] {
            state.apply(&reading("ec", InterpolationHint::Linear, v, t));
        }
        assert_eq!(state.active_model(), Some(InterpolationHint::Linear));
        let history = state.metrics().history().to_vec();
        assert_eq!(history.len(), 2);

        let outcome = state.apply(&reading("ec", InterpolationHint::Polynomial, 2.5, 20_000));
        assert_eq!(outcome, Ingest::Duplicate);
        assert_eq!(state.hint(), InterpolationHint::Polynomial);
        assert_eq!(state.active_model(), Some(InterpolationHint::Polynomial));
        // No sample joined, so no prediction was scored
        assert_eq!(state.metrics().history(), history.as_slice());
    }
}
