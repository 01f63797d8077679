//! Least-squares fitting routines
//!
//! All routines work on a time axis in seconds, sorted ascending with no
//! duplicates. Callers check minimum sample counts before fitting; the
//! routines re-check and report `InsufficientSamples` rather than panic.

use crate::config::FitConfig;
use crate::error::ReconstructError;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Relative width of the golden-section bracket (in log-offset space) at
/// which the logarithmic offset search stops
const LOG_OFFSET_TOLERANCE: f64 = 1e-6;

/// Step norm below which Levenberg-Marquardt is converged
const MIN_STEP_NORM: f64 = 1e-12;

/// Damping above which no descent direction is left
const MAX_DAMPING: f64 = 1e12;

/// Piecewise-linear interpolation, holding the end values outside the range
pub fn linear_interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 || x <= xs[0] {
        return ys[0];
    }
    if x >= xs[n - 1] {
        return ys[n - 1];
    }
    let i = xs[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Ordinary least squares `y = slope·z + intercept`
fn regress(zs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = zs.len() as f64;
    let mean_z = zs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut szz = 0.0;
    let mut szy = 0.0;
    for (z, y) in zs.iter().zip(ys) {
        szz += (z - mean_z) * (z - mean_z);
        szy += (z - mean_z) * (y - mean_y);
    }
    if szz <= 0.0 || !szz.is_finite() {
        return None;
    }
    let slope = szy / szz;
    Some((slope, mean_y - slope * mean_z))
}

/// Fitted `a·ln(x − t0) + b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogFit {
    pub a: f64,
    pub b: f64,
    /// Offset origin; always below the earliest sample
    pub t0: f64,
    /// Earliest sample time; estimates before it hold its value
    pub x_min: f64,
}

impl LogFit {
    pub fn eval(&self, x: f64) -> f64 {
        self.a * (x.max(self.x_min) - self.t0).ln() + self.b
    }
}

/// Fit the logarithmic model
///
/// `t0 = x_min − ε`. For a fixed ε the problem is linear in `ln(x − t0)`,
/// so `(a, b)` is closed-form and only ε is searched: a log-spaced scan
/// over `[1e-3·span, 10·span]` followed by golden-section refinement.
pub fn fit_logarithmic(xs: &[f64], ys: &[f64], config: &FitConfig) -> Result<LogFit, ReconstructError> {
    let n = xs.len();
    if n < 3 {
        return Err(ReconstructError::InsufficientSamples {
            model: "logarithmic",
            needed: 3,
            available: n,
        });
    }
    let x_min = xs[0];
    let span = xs[n - 1] - x_min;
    let diverged = |iterations| ReconstructError::FitDiverged {
        model: "logarithmic",
        iterations,
    };
    if !(span > 0.0) {
        return Err(diverged(0));
    }

    let mut zs = vec![0.0; n];
    let mut fit_at = |ln_eps: f64| -> Option<(f64, f64, f64)> {
        let eps = ln_eps.exp();
        for (z, x) in zs.iter_mut().zip(xs) {
            *z = (x - x_min + eps).ln();
        }
        let (a, b) = regress(&zs, ys)?;
        let sse: f64 = zs
            .iter()
            .zip(ys)
            .map(|(z, y)| (a * z + b - y).powi(2))
            .sum();
        sse.is_finite().then_some((sse, a, b))
    };
    let mut sse_at = |ln_eps: f64| fit_at(ln_eps).map_or(f64::INFINITY, |(sse, _, _)| sse);

    let points = config.log_offset_grid.max(3);
    let lo = (1e-3 * span).ln();
    let hi = (10.0 * span).ln();
    let grid: Vec<f64> = (0..points)
        .map(|i| lo + (hi - lo) * i as f64 / (points - 1) as f64)
        .collect();
    let scores: Vec<f64> = grid.iter().map(|&g| sse_at(g)).collect();
    let best = scores
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut left = grid[best.saturating_sub(1)];
    let mut right = grid[(best + 1).min(points - 1)];
    let phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut c = right - phi * (right - left);
    let mut d = left + phi * (right - left);
    let mut fc = sse_at(c);
    let mut fd = sse_at(d);
    let mut iterations = 0;
    while right - left > LOG_OFFSET_TOLERANCE && iterations < config.max_iterations {
        if fc < fd {
            right = d;
            d = c;
            fd = fc;
            c = right - phi * (right - left);
            fc = sse_at(c);
        } else {
            left = c;
            c = d;
            fc = fd;
            d = left + phi * (right - left);
            fd = sse_at(d);
        }
        iterations += 1;
    }

    let ln_eps = (left + right) / 2.0;
    let (_, a, b) = fit_at(ln_eps).ok_or_else(|| diverged(iterations))?;
    let fit = LogFit {
        a,
        b,
        t0: x_min - ln_eps.exp(),
        x_min,
    };
    if !(fit.a.is_finite() && fit.b.is_finite() && fit.t0.is_finite()) {
        return Err(diverged(iterations));
    }
    Ok(fit)
}

/// Fitted polynomial on normalised time `u = (x − centre) / half_span`
#[derive(Debug, Clone, PartialEq)]
pub struct PolyFit {
    /// Coefficients, constant term first
    pub coefficients: Vec<f64>,
    pub centre: f64,
    pub half_span: f64,
}

impl PolyFit {
    pub fn eval(&self, x: f64) -> f64 {
        let u = (x - self.centre) / self.half_span;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * u + c)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

/// Least-squares polynomial of the given degree, solved by SVD
pub fn fit_polynomial(xs: &[f64], ys: &[f64], degree: usize) -> Result<PolyFit, ReconstructError> {
    let n = xs.len();
    let cols = degree + 1;
    if n < cols {
        return Err(ReconstructError::InsufficientSamples {
            model: "polynomial",
            needed: cols,
            available: n,
        });
    }
    let centre = (xs[0] + xs[n - 1]) / 2.0;
    let half_span = match (xs[n - 1] - xs[0]) / 2.0 {
        h if h > 0.0 => h,
        _ => 1.0,
    };

    let design = DMatrix::from_fn(n, cols, |i, j| ((xs[i] - centre) / half_span).powi(j as i32));
    let target = DVector::from_column_slice(&ys[..n]);
    let diverged = ReconstructError::FitDiverged {
        model: "polynomial",
        iterations: 0,
    };
    let solution = design
        .svd(true, true)
        .solve(&target, 1e-12)
        .map_err(|_| diverged.clone())?;
    if solution.iter().any(|c| !c.is_finite()) {
        return Err(diverged);
    }

    Ok(PolyFit {
        coefficients: solution.iter().copied().collect(),
        centre,
        half_span,
    })
}

/// Fitted `L / (1 + e^{−k(x − t0)})`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidFit {
    pub l: f64,
    pub k: f64,
    pub t0: f64,
    /// Iterations the fit took
    pub iterations: u32,
}

impl SigmoidFit {
    pub fn eval(&self, x: f64) -> f64 {
        sigmoid(self.params(), x)
    }

    fn params(&self) -> Vector3<f64> {
        Vector3::new(self.l, self.k, self.t0)
    }
}

fn logistic(k: f64, t0: f64, x: f64) -> f64 {
    let z = -k * (x - t0);
    if z > 700.0 {
        0.0
    } else {
        1.0 / (1.0 + z.exp())
    }
}

fn sigmoid(p: Vector3<f64>, x: f64) -> f64 {
    p[0] * logistic(p[1], p[2], x)
}

fn sigmoid_sse(p: Vector3<f64>, xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| (y - sigmoid(p, x)).powi(2))
        .sum()
}

/// Initial parameters from the logit linearisation
/// `ln(y / (L − y)) = k·x − k·t0` with `L` just above the extreme sample
fn logit_guess(xs: &[f64], ys: &[f64]) -> Vector3<f64> {
    let y_max = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let y_min = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let l0 = if y_max > 0.0 { y_max * 1.05 } else { y_min * 1.05 };

    let zs: Vec<f64> = ys
        .iter()
        .map(|&y| {
            let q = (y / l0).clamp(1e-6, 1.0 - 1e-6);
            (q / (1.0 - q)).ln()
        })
        .collect();

    let span = (xs[xs.len() - 1] - xs[0]).max(f64::EPSILON);
    let mean_x = xs.iter().sum::<f64>() / xs.len() as f64;
    match regress(xs, &zs) {
        Some((k, c)) if k.abs() > 1e-12 => Vector3::new(l0, k, -c / k),
        _ => Vector3::new(l0, 4.0 / span, mean_x),
    }
}

/// Fit the sigmoidal model by Levenberg-Marquardt
///
/// Starts from the better of the logit guess and `warm` (the previous fit).
/// Converged when the relative SSE decrease drops below
/// `config.tolerance`, the step norm below 1e-12, or no damping yields a
/// descent. Not converging within `config.max_iterations` is
/// `FitDiverged`.
pub fn fit_sigmoid(
    xs: &[f64],
    ys: &[f64],
    config: &FitConfig,
    warm: Option<&SigmoidFit>,
) -> Result<SigmoidFit, ReconstructError> {
    let n = xs.len();
    if n < 3 {
        return Err(ReconstructError::InsufficientSamples {
            model: "sigmoidal",
            needed: 3,
            available: n,
        });
    }

    let mut p = logit_guess(xs, ys);
    let mut sse = sigmoid_sse(p, xs, ys);
    if let Some(prev) = warm {
        let warm_sse = sigmoid_sse(prev.params(), xs, ys);
        if warm_sse.is_finite() && (warm_sse < sse || !sse.is_finite()) {
            p = prev.params();
            sse = warm_sse;
        }
    }
    if !sse.is_finite() {
        return Err(ReconstructError::FitDiverged {
            model: "sigmoidal",
            iterations: 0,
        });
    }

    let done = |p: Vector3<f64>, iterations| SigmoidFit {
        l: p[0],
        k: p[1],
        t0: p[2],
        iterations,
    };

    let mut lambda = 1e-3;
    for iteration in 1..=config.max_iterations {
        if sse == 0.0 {
            return Ok(done(p, iteration));
        }

        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        for (&x, &y) in xs.iter().zip(ys) {
            let s = logistic(p[1], p[2], x);
            let ds = s * (1.0 - s);
            let j = Vector3::new(s, p[0] * ds * (x - p[2]), -p[0] * ds * p[1]);
            jtj += j * j.transpose();
            jtr += j * (y - p[0] * s);
        }

        let mut damped = jtj;
        for i in 0..3 {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }

        let step = match damped.lu().solve(&jtr) {
            Some(step) if step.iter().all(|v| v.is_finite()) => step,
            _ => {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return Ok(done(p, iteration));
                }
                continue;
            }
        };

        let candidate = p + step;
        let candidate_sse = sigmoid_sse(candidate, xs, ys);
        if candidate_sse.is_finite() && candidate_sse < sse {
            let improvement = (sse - candidate_sse) / sse;
            p = candidate;
            sse = candidate_sse;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < config.tolerance || step.norm() < MIN_STEP_NORM {
                return Ok(done(p, iteration));
            }
        } else {
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                return Ok(done(p, iteration));
            }
        }
    }

    Err(ReconstructError::FitDiverged {
        model: "sigmoidal",
        iterations: config.max_iterations,
    })
}
