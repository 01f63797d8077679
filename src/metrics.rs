//! Metrics collection for CFE-HYDRO reconstruction analysis
//!
//! This module provides fit-quality statistics (RMSE, R², MAE), the
//! per-signal convergence history tracked as samples arrive, and the
//! offline efficiency score used when comparing sparsity ratios.
//!
//! The running statistics are one-step-ahead: each arriving sample is
//! first predicted by the model fitted to the samples before it, and only
//! then joins the fit.

use crate::protocol::TimestampMs;
use crate::reconstruct::Estimator;
use std::time::Duration;

/// Quality of an estimate against a set of observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitQuality {
    /// Observations compared
    pub samples: usize,
    /// Root mean square error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination; `None` with fewer than two samples
    pub r2: Option<f64>,
}

impl FitQuality {
    /// Compare paired observations and predictions
    ///
    /// Returns `None` if there is nothing to compare.
    pub fn from_pairs(observed: &[f64], predicted: &[f64]) -> Option<Self> {
        let n = observed.len().min(predicted.len());
        if n == 0 {
            return None;
        }
        let observed = &observed[..n];
        let predicted = &predicted[..n];

        let mut ss_res = 0.0;
        let mut abs_sum = 0.0;
        for (o, p) in observed.iter().zip(predicted) {
            let e = o - p;
            ss_res += e * e;
            abs_sum += e.abs();
        }

        let r2 = if n < 2 {
            None
        } else {
            let mean = observed.iter().sum::<f64>() / n as f64;
            let ss_tot: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();
            if ss_tot == 0.0 {
                // A flat signal is either matched exactly or not at all.
                Some(if ss_res == 0.0 { 1.0 } else { 0.0 })
            } else {
                Some(1.0 - ss_res / ss_tot)
            }
        };

        Some(Self {
            samples: n,
            rmse: (ss_res / n as f64).sqrt(),
            mae: abs_sum / n as f64,
            r2,
        })
    }

    /// Evaluate an estimator against dense ground truth
    ///
    /// Points where the estimator has no value are skipped.
    pub fn evaluate<E: Estimator + ?Sized>(
        estimator: &E,
        truth: &[(TimestampMs, f64)],
    ) -> Option<Self> {
        let mut observed = Vec::with_capacity(truth.len());
        let mut predicted = Vec::with_capacity(truth.len());
        for &(t, value) in truth {
            if let Ok(estimate) = estimator.estimate(t) {
                observed.push(value);
                predicted.push(estimate);
            }
        }
        Self::from_pairs(&observed, &predicted)
    }
}

/// `r2 · ln(1 / (pct/100 + 0.01))`: rewards good fits at low sparsity ratios
///
/// Zero when R² is undefined or negative.
pub fn efficiency_score(r2: Option<f64>, transmitted_percent: f64) -> f64 {
    match r2 {
        Some(r2) if r2.is_finite() && r2 >= 0.0 => {
            r2 * (1.0 / (transmitted_percent / 100.0 + 0.01)).ln()
        }
        _ => 0.0,
    }
}

/// One point of the convergence series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePoint {
    /// Samples the predicting model was fitted to
    pub sample_count: usize,
    /// RMSE over every prediction made so far
    pub rmse: f64,
}

/// Running sums over prediction errors and observed values
#[derive(Debug, Clone, Copy, Default)]
struct Running {
    n: usize,
    sq_err: f64,
    abs_err: f64,
    mean: f64,
    /// Sum of squared deviations from `mean` (Welford)
    m2: f64,
}

impl Running {
    fn push(&mut self, observed: f64, predicted: f64) {
        let e = observed - predicted;
        self.n += 1;
        self.sq_err += e * e;
        self.abs_err += e.abs();
        let delta = observed - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (observed - self.mean);
    }

    fn quality(&self) -> Option<FitQuality> {
        if self.n == 0 {
            return None;
        }
        let n = self.n as f64;
        let r2 = if self.n < 2 {
            None
        } else if self.m2 == 0.0 {
            Some(if self.sq_err == 0.0 { 1.0 } else { 0.0 })
        } else {
            Some(1.0 - self.sq_err / self.m2)
        };
        Some(FitQuality {
            samples: self.n,
            rmse: (self.sq_err / n).sqrt(),
            mae: self.abs_err / n,
            r2,
        })
    }
}

/// Running prediction statistics for one signal
#[derive(Debug, Clone, Default)]
pub struct MetricsTracker {
    running: Running,
    latest: Option<FitQuality>,
    history: Vec<ConvergencePoint>,
}

impl MetricsTracker {
    /// Create new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the prediction of a new sample by a model fitted to
    /// `sample_count` earlier samples
    pub fn record(&mut self, sample_count: usize, observed: f64, predicted: f64) {
        if !(observed.is_finite() && predicted.is_finite()) {
            return;
        }
        self.running.push(observed, predicted);
        self.latest = self.running.quality();
        if let Some(q) = self.latest {
            self.history.push(ConvergencePoint {
                sample_count,
                rmse: q.rmse,
            });
        }
    }

    /// Prediction quality over every recorded sample
    pub fn latest(&self) -> Option<FitQuality> {
        self.latest
    }

    /// Latest RMSE
    pub fn rmse(&self) -> Option<f64> {
        self.latest.map(|q| q.rmse)
    }

    /// Latest R²
    pub fn r2(&self) -> Option<f64> {
        self.latest.and_then(|q| q.r2)
    }

    /// Convergence series in recording order
    pub fn history(&self) -> &[ConvergencePoint] {
        &self.history
    }

    /// Number of recorded predictions
    pub fn updates(&self) -> usize {
        self.running.n
    }

    /// Least-squares slope of RMSE against sample count
    ///
    /// Negative when the fit is converging.
    pub fn rmse_trend(&self) -> Option<f64> {
        if self.history.len() < 2 {
            return None;
        }
        let n = self.history.len() as f64;
        let mean_x = self.history.iter().map(|p| p.sample_count as f64).sum::<f64>() / n;
        let mean_y = self.history.iter().map(|p| p.rmse).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for p in &self.history {
            let dx = p.sample_count as f64 - mean_x;
            sxx += dx * dx;
            sxy += dx * (p.rmse - mean_y);
        }
        if sxx == 0.0 {
            return None;
        }
        Some(sxy / sxx)
    }

    /// Confidence bound for a forecast `horizon` ahead
    ///
    /// The last RMSE is reported for any short horizon; no time-decaying
    /// model is applied.
    pub fn forecast_error(&self, _horizon: Duration) -> Option<f64> {
        self.rmse()
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Reconstruction Metrics ===\n\n");

        match self.latest {
            Some(q) => {
                report.push_str(&format!("Predicted samples: {}\n", q.samples));
                report.push_str(&format!("RMSE: {:.4}\n", q.rmse));
                report.push_str(&format!("MAE: {:.4}\n", q.mae));
                match q.r2 {
                    Some(r2) => report.push_str(&format!("R²: {:.4}\n", r2)),
                    None => report.push_str("R²: n/a\n"),
                }
            }
            None => report.push_str("No samples\n"),
        }

        if let Some(trend) = self.rmse_trend() {
            let direction = if trend < 0.0 { "converging" } else { "not converging" };
            report.push_str(&format!(
                "RMSE trend: {:+.6} per sample ({})\n",
                trend, direction
            ));
        }

        report
    }
}
