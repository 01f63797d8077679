//! Reconstruction models
//!
//! The hint is a closed set, so model dispatch is an exhaustive match on
//! [`InterpolationHint`] rather than anything string-keyed.

use super::fit::{self, LogFit, PolyFit, SigmoidFit};
use crate::config::FitConfig;
use crate::error::ReconstructError;
use crate::protocol::InterpolationHint;

/// A fitted model, ready to evaluate
#[derive(Debug, Clone, PartialEq)]
pub enum FittedModel {
    /// Piecewise-linear through the samples themselves
    Linear,
    Logarithmic(LogFit),
    Polynomial(PolyFit),
    Sigmoidal(SigmoidFit),
}

impl FittedModel {
    /// Fit the model selected by `hint`
    ///
    /// `previous` seeds iterative fits when it is of the same kind.
    pub fn fit(
        hint: InterpolationHint,
        xs: &[f64],
        ys: &[f64],
        polynomial_degree: usize,
        config: &FitConfig,
        previous: Option<&FittedModel>,
    ) -> Result<Self, ReconstructError> {
        match hint {
            InterpolationHint::Linear => {
                if xs.len() < 2 {
                    return Err(ReconstructError::InsufficientSamples {
                        model: hint.as_str(),
                        needed: 2,
                        available: xs.len(),
                    });
                }
                Ok(FittedModel::Linear)
            }
            InterpolationHint::Logarithmic => {
                fit::fit_logarithmic(xs, ys, config).map(FittedModel::Logarithmic)
            }
            InterpolationHint::Polynomial => {
                fit::fit_polynomial(xs, ys, polynomial_degree).map(FittedModel::Polynomial)
            }
            InterpolationHint::Sigmoidal => {
                let warm = match previous {
                    Some(FittedModel::Sigmoidal(prev)) => Some(prev),
                    _ => None,
                };
                fit::fit_sigmoid(xs, ys, config, warm).map(FittedModel::Sigmoidal)
            }
        }
    }

    /// Model kind
    pub fn kind(&self) -> InterpolationHint {
        match self {
            FittedModel::Linear => InterpolationHint::Linear,
            FittedModel::Logarithmic(_) => InterpolationHint::Logarithmic,
            FittedModel::Polynomial(_) => InterpolationHint::Polynomial,
            FittedModel::Sigmoidal(_) => InterpolationHint::Sigmoidal,
        }
    }

    /// Evaluate at `x` seconds; `xs`/`ys` are the samples the model was
    /// built from
    pub fn eval(&self, xs: &[f64], ys: &[f64], x: f64) -> f64 {
        match self {
            FittedModel::Linear => fit::linear_interpolate(xs, ys, x),
            FittedModel::Logarithmic(m) => m.eval(x),
            FittedModel::Polynomial(m) => m.eval(x),
            FittedModel::Sigmoidal(m) => m.eval(x),
        }
    }
}
