// CFE-HYDRO Testdata - Signal patterns
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Noise-free signal shapes.
//!
//! Every pattern is a pure function of time since the start of the run, so
//! the same pattern doubles as the ground truth a reconstruction is scored
//! against.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Signal pattern definition.
///
/// Patterns can be summed using `Composite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalPattern {
    /// Constant value.
    Constant { value: f64 },

    /// Linear trend.
    ///
    /// `value = start + slope_per_ms * t`
    Linear { start: f64, slope_per_ms: f64 },

    /// Logarithmic settling, e.g. pH drifting after a dose.
    ///
    /// `value = start + amplitude * ln(1 + t/tau_ms)`
    Logarithmic {
        start: f64,
        amplitude: f64,
        tau_ms: f64,
    },

    /// Polynomial in scaled time.
    ///
    /// `value = sum(c[i] * (t/time_scale_ms)^i)`
    Polynomial {
        coefficients: Vec<f64>,
        time_scale_ms: f64,
    },

    /// Logistic transition between two levels.
    ///
    /// `value = floor + capacity / (1 + exp(-rate_per_ms * (t - midpoint_ms)))`
    Sigmoid {
        floor: f64,
        capacity: f64,
        rate_per_ms: f64,
        midpoint_ms: f64,
    },

    /// Sinusoidal wave.
    ///
    /// `value = offset + amplitude * sin(2*PI*t/period_ms + phase)`
    Sine {
        amplitude: f64,
        period_ms: u64,
        phase: f64,
        offset: f64,
    },

    /// Exponential decay toward target.
    ///
    /// `value = target + (start - target) * exp(-t/tau_ms)`
    Decay {
        start: f64,
        target: f64,
        tau_ms: f64,
    },

    /// Sum of patterns.
    Composite(Vec<SignalPattern>),
}

impl SignalPattern {
    /// Evaluate the pattern `t_ms` milliseconds after the start.
    pub fn evaluate(&self, t_ms: u64) -> f64 {
        let t = t_ms as f64;
        match self {
            SignalPattern::Constant { value } => *value,
            SignalPattern::Linear {
                start,
                slope_per_ms,
            } => start + slope_per_ms * t,
            SignalPattern::Logarithmic {
                start,
                amplitude,
                tau_ms,
            } => {
                if *tau_ms <= 0.0 {
                    return *start;
                }
                start + amplitude * (1.0 + t / tau_ms).ln()
            }
            SignalPattern::Polynomial {
                coefficients,
                time_scale_ms,
            } => {
                let u = if *time_scale_ms > 0.0 {
                    t / time_scale_ms
                } else {
                    0.0
                };
                // Horner
                coefficients.iter().rev().fold(0.0, |acc, c| acc * u + c)
            }
            SignalPattern::Sigmoid {
                floor,
                capacity,
                rate_per_ms,
                midpoint_ms,
            } => floor + capacity / (1.0 + (-rate_per_ms * (t - midpoint_ms)).exp()),
            SignalPattern::Sine {
                amplitude,
                period_ms,
                phase,
                offset,
            } => {
                if *period_ms == 0 {
                    return *offset;
                }
                offset + amplitude * (2.0 * PI * t / *period_ms as f64 + phase).sin()
            }
            SignalPattern::Decay {
                start,
                target,
                tau_ms,
            } => {
                if *tau_ms <= 0.0 {
                    return *target;
                }
                target + (start - target) * (-t / tau_ms).exp()
            }
            SignalPattern::Composite(parts) => parts.iter().map(|p| p.evaluate(t_ms)).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let p = SignalPattern::Linear {
            start: 10.0,
            slope_per_ms: 0.001,
        };
        assert_eq!(p.evaluate(0), 10.0);
        assert!((p.evaluate(1000) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_logarithmic_starts_at_start() {
        let p = SignalPattern::Logarithmic {
            start: 6.0,
            amplitude: 0.5,
            tau_ms: 10_000.0,
        };
        assert_eq!(p.evaluate(0), 6.0);
        assert!(p.evaluate(60_000) > p.evaluate(30_000));
    }

    #[test]
    fn test_polynomial_horner() {
        let p = SignalPattern::Polynomial {
            coefficients: vec![1.0, 2.0, 3.0],
            time_scale_ms: 1000.0,
        };
        // 1 + 2*2 + 3*4
        assert!((p.evaluate(2000) - 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_midpoint() {
        let p = SignalPattern::Sigmoid {
            floor: 2.0,
            capacity: 6.0,
            rate_per_ms: 0.001,
            midpoint_ms: 5000.0,
        };
        assert!((p.evaluate(5000) - 5.0).abs() < 1e-12);
        assert!(p.evaluate(50_000) > 7.99);
    }

    #[test]
    fn test_decay_and_composite() {
        let decay = SignalPattern::Decay {
            start: 10.0,
            target: 0.0,
            tau_ms: 1000.0,
        };
        assert!(decay.evaluate(10_000) < 0.001);

        let sum = SignalPattern::Composite(vec![
            SignalPattern::Constant { value: 1.0 },
            SignalPattern::Constant { value: 2.0 },
        ]);
        assert_eq!(sum.evaluate(123), 3.0);
    }

    #[test]
    fn test_degenerate_parameters() {
        let sine = SignalPattern::Sine {
            amplitude: 1.0,
            period_ms: 0,
            phase: 0.0,
            offset: 4.0,
        };
        assert_eq!(sine.evaluate(500), 4.0);
    }
}
