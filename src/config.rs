//! Configuration types for CFE-HYDRO
//!
//! Every struct here has a `Default` matching the reference deployment and
//! derives serde so a node can load a whole [`DeploymentConfig`] from JSON.

use crate::error::{CfeError, Result};
use crate::protocol::DEFAULT_TOPIC;
use crate::recovery::ReconnectPolicy;
use crate::registry::{hydroponics_descriptors, SignalDescriptor, SignalRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How many of a window's `n` readings are transmitted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SparsityPolicy {
    /// Transmit `max(1, round(n * ratio))` readings; ratio in (0, 1]
    Ratio(f64),
    /// Transmit exactly this many readings (or all `n` if fewer)
    Fixed(usize),
}

impl Default for SparsityPolicy {
    fn default() -> Self {
        SparsityPolicy::Ratio(1.0 / 3.0)
    }
}

impl SparsityPolicy {
    /// Target count `k` for a window holding `n` readings
    pub fn target_count(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let k = match *self {
            SparsityPolicy::Ratio(ratio) => ((n as f64) * ratio).round().max(1.0) as usize,
            SparsityPolicy::Fixed(k) => k,
        };
        k.min(n)
    }

    fn validate(&self) -> Result<()> {
        match *self {
            SparsityPolicy::Ratio(r) if !(r > 0.0 && r <= 1.0) => Err(CfeError::Config(format!(
                "sparsity ratio {} outside (0, 1]",
                r
            ))),
            SparsityPolicy::Fixed(0) => Err(CfeError::Config(
                "fixed sparsity must transmit at least one reading".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Sender-side configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Device identifier placed in every packet
    pub device_id: String,
    /// High-rate sampling period (ms)
    pub sampling_interval_ms: u64,
    /// Window length (ms)
    pub transmission_interval_ms: u64,
    /// Readings transmitted per window
    #[serde(default)]
    pub sparsity: SparsityPolicy,
    /// Pub/sub topic
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            device_id: "cfe-hydro-01".to_string(),
            sampling_interval_ms: 10_000,      // 10 s
            transmission_interval_ms: 300_000, // 5 min
            sparsity: SparsityPolicy::default(),
            topic: default_topic(),
        }
    }
}

impl SenderConfig {
    /// Create a configuration with custom intervals
    pub fn with_intervals(sampling_interval_ms: u64, transmission_interval_ms: u64) -> Self {
        Self {
            sampling_interval_ms,
            transmission_interval_ms,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom sparsity policy
    pub fn with_sparsity(sparsity: SparsityPolicy) -> Self {
        Self {
            sparsity,
            ..Default::default()
        }
    }

    /// Check interval ordering and sparsity bounds
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval_ms == 0 || self.transmission_interval_ms == 0 {
            return Err(CfeError::Config("intervals must be non-zero".to_string()));
        }
        if self.sampling_interval_ms > self.transmission_interval_ms {
            return Err(CfeError::Config(format!(
                "sampling interval {}ms exceeds transmission interval {}ms",
                self.sampling_interval_ms, self.transmission_interval_ms
            )));
        }
        self.sparsity.validate()
    }
}

/// Transport session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between reconnect attempts
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Consecutive publish failures tolerated before dropping to Disconnected
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            max_consecutive_failures: 3,
        }
    }
}

/// Nonlinear fit controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Iteration cap for Levenberg-Marquardt and golden-section search
    pub max_iterations: u32,
    /// Relative SSE improvement below which a fit is converged
    pub tolerance: f64,
    /// Grid points when scanning the logarithmic offset
    pub log_offset_grid: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            log_offset_grid: 48,
        }
    }
}

/// Physical clamp applied to estimates of one signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBounds {
    pub min: f64,
    pub max: f64,
}

impl ValueBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Finite with `min <= max`
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    /// Clamp a value into the bounds
    ///
    /// Invalid bounds leave the value unchanged.
    pub fn apply(&self, value: f64) -> f64 {
        if self.is_valid() {
            value.clamp(self.min, self.max)
        } else {
            value
        }
    }
}

/// Receiver-side reconstruction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructorConfig {
    /// Degree of the Polynomial model
    pub polynomial_degree: usize,
    /// Nonlinear fit controls
    #[serde(default)]
    pub fit: FitConfig,
    /// Optional per-signal clamp on estimates
    #[serde(default)]
    pub bounds: HashMap<String, ValueBounds>,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            polynomial_degree: 2,
            fit: FitConfig::default(),
            bounds: HashMap::new(),
        }
    }
}

impl ReconstructorConfig {
    /// Create a configuration with a specific polynomial degree
    pub fn with_polynomial_degree(polynomial_degree: usize) -> Self {
        Self {
            polynomial_degree,
            ..Default::default()
        }
    }

    /// Physical limits of the hydroponics signals
    pub fn hydroponics() -> Self {
        let mut bounds = HashMap::new();
        bounds.insert("ph".to_string(), ValueBounds::new(0.0, 14.0));
        bounds.insert("ec".to_string(), ValueBounds::new(0.0, 20.0));
        bounds.insert("do".to_string(), ValueBounds::new(0.0, 20.0));
        Self {
            bounds,
            ..Default::default()
        }
    }

    /// Reject a zero-degree polynomial, a degenerate fit configuration or
    /// inverted bounds
    pub fn validate(&self) -> Result<()> {
        if self.polynomial_degree == 0 {
            return Err(CfeError::Config(
                "polynomial degree must be at least 1".to_string(),
            ));
        }
        if self.fit.max_iterations == 0 || self.fit.log_offset_grid < 3 {
            return Err(CfeError::Config(
                "fit needs at least one iteration and three grid points".to_string(),
            ));
        }
        if let Some((signal_id, bounds)) = self.bounds.iter().find(|(_, b)| !b.is_valid()) {
            return Err(CfeError::Config(format!(
                "bounds for {} must be finite with min <= max, got [{}, {}]",
                signal_id, bounds.min, bounds.max
            )));
        }
        Ok(())
    }
}

/// Complete deployment: both ends of the link plus the signal catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reconstructor: ReconstructorConfig,
    pub signals: Vec<SignalDescriptor>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            sender: SenderConfig::default(),
            session: SessionConfig::default(),
            reconstructor: ReconstructorConfig::hydroponics(),
            signals: hydroponics_descriptors(),
        }
    }
}

impl DeploymentConfig {
    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CfeError::Config(e.to_string()))
    }

    /// Validate every part and build the signal registry
    pub fn build_registry(&self) -> Result<SignalRegistry> {
        self.sender.validate()?;
        self.reconstructor.validate()?;
        SignalRegistry::new(self.signals.clone())
    }
}
