// CFE-HYDRO Testdata - Core generator
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Dataset generation and live sensor simulation.

use crate::dataset::{Dataset, DatasetRow};
use crate::patterns::SignalPattern;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

/// Generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Start timestamp in milliseconds.
    pub start_time_ms: u64,
    /// Interval between samples in milliseconds.
    pub sample_interval_ms: u64,
    /// Number of samples to generate.
    pub num_samples: usize,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start_time_ms: 0,
            sample_interval_ms: 10_000, // 10 s, the default sampling interval
            num_samples: 360,           // 1 hour
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set start timestamp.
    pub fn with_start_time(mut self, timestamp_ms: u64) -> Self {
        self.start_time_ms = timestamp_ms;
        self
    }

    /// Set sample interval.
    pub fn with_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    /// Set number of samples.
    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    /// Set duration in minutes (calculates num_samples from interval).
    pub fn with_duration_minutes(mut self, minutes: f64) -> Self {
        let total_ms = minutes * 60_000.0;
        self.num_samples = (total_ms / self.sample_interval_ms.max(1) as f64).ceil() as usize;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Timestamps of every sample.
    pub fn timestamps(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_samples as u64).map(move |i| self.start_time_ms + i * self.sample_interval_ms)
    }
}

/// One simulated sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Signal identifier.
    pub id: String,
    pub unit: String,
    /// Physical range; values are clamped into it.
    pub min: f64,
    pub max: f64,
    pub pattern: SignalPattern,
    /// Standard deviation of Gaussian read noise.
    pub noise_std: f64,
    /// Probability that a read fails.
    pub dropout_rate: f64,
}

impl SensorConfig {
    pub fn new(id: &str, unit: &str, min: f64, max: f64, pattern: SignalPattern) -> Self {
        Self {
            id: id.to_string(),
            unit: unit.to_string(),
            min,
            max,
            pattern,
            noise_std: 0.0,
            dropout_rate: 0.0,
        }
    }

    /// Add read noise.
    pub fn with_noise(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }

    /// Make some reads fail.
    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Noise-free value, `t_ms` after the start of the run.
    pub fn true_value(&self, t_ms: u64) -> f64 {
        self.pattern.evaluate(t_ms).clamp(self.min, self.max)
    }

    /// One read: truth plus noise, clamped; `None` on dropout.
    pub fn read<R: Rng + ?Sized>(&self, t_ms: u64, rng: &mut R) -> Option<f64> {
        if self.dropout_rate > 0.0 && rng.gen_bool(self.dropout_rate) {
            return None;
        }
        let mut value = self.pattern.evaluate(t_ms);
        if self.noise_std > 0.0 {
            if let Ok(noise) = Normal::new(0.0, self.noise_std) {
                value += noise.sample(rng);
            }
        }
        Some(value.clamp(self.min, self.max))
    }
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Generate a dataset from configuration.
pub fn generate_dataset(config: &GeneratorConfig, sensors: &[SensorConfig]) -> Dataset {
    let mut rng = rng_for(config.seed);
    let mut dataset = Dataset::new(sensors.iter().map(|s| s.id.clone()).collect());
    dataset.seed = config.seed;

    for timestamp_ms in config.timestamps() {
        // Patterns run on time since start
        let relative = timestamp_ms - config.start_time_ms;
        let readings = sensors.iter().map(|s| s.read(relative, &mut rng)).collect();
        let truth = sensors.iter().map(|s| s.true_value(relative)).collect();
        dataset.push(DatasetRow {
            timestamp_ms,
            readings,
            truth,
        });
    }

    dataset
}

/// Dense noise-free series for one sensor.
pub fn ground_truth(config: &GeneratorConfig, sensor: &SensorConfig) -> Vec<(u64, f64)> {
    config
        .timestamps()
        .map(|t| (t, sensor.true_value(t - config.start_time_ms)))
        .collect()
}

/// Sensors read on demand at arbitrary instants.
#[derive(Debug, Clone)]
pub struct Simulator {
    sensors: Vec<SensorConfig>,
    start_time_ms: u64,
    rng: StdRng,
}

impl Simulator {
    pub fn new(sensors: Vec<SensorConfig>, start_time_ms: u64, seed: Option<u64>) -> Self {
        Self {
            sensors,
            start_time_ms,
            rng: rng_for(seed),
        }
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensors
    }

    pub fn sensor(&self, id: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.id == id)
    }

    /// Read one sensor; `None` for an unknown id or a dropout.
    pub fn read(&mut self, id: &str, timestamp_ms: u64) -> Option<f64> {
        let relative = timestamp_ms.saturating_sub(self.start_time_ms);
        let sensor = self.sensors.iter().find(|s| s.id == id)?;
        sensor.read(relative, &mut self.rng)
    }

    /// Noise-free value of one sensor.
    pub fn truth(&self, id: &str, timestamp_ms: u64) -> Option<f64> {
        let relative = timestamp_ms.saturating_sub(self.start_time_ms);
        self.sensor(id).map(|s| s.true_value(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> SensorConfig {
        SensorConfig::new(
            "temperature",
            "°C",
            0.0,
            40.0,
            SignalPattern::Linear {
                start: 20.0,
                slope_per_ms: 0.0001,
            },
        )
    }

    #[test]
    fn test_generate_deterministic_with_seed() {
        let config = GeneratorConfig::new().with_num_samples(50).with_seed(7);
        let sensors = vec![ramp().with_noise(0.5)];
        let a = generate_dataset(&config, &sensors);
        let b = generate_dataset(&config, &sensors);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.len(), 50);
        assert_eq!(a.seed, Some(7));
    }

    #[test]
    fn test_truth_ignores_noise() {
        let config = GeneratorConfig::new()
            .with_start_time(1_000_000)
            .with_num_samples(3)
            .with_sample_interval_ms(10_000);
        let truth = ground_truth(&config, &ramp().with_noise(5.0));
        let times: Vec<u64> = truth.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![1_000_000, 1_010_000, 1_020_000]);
        assert!((truth[2].1 - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_and_dropout() {
        let sensor = SensorConfig::new("ph", "pH", 0.0, 14.0, SignalPattern::Constant { value: 20.0 })
            .with_dropout(1.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(sensor.read(0, &mut rng), None);
        assert_eq!(sensor.true_value(0), 14.0);
    }

    #[test]
    fn test_duration_minutes() {
        let config = GeneratorConfig::new()
            .with_sample_interval_ms(10_000)
            .with_duration_minutes(5.0);
        assert_eq!(config.num_samples, 30);
    }

    #[test]
    fn test_simulator_reads() {
        let mut sim = Simulator::new(vec![ramp()], 5_000, Some(3));
        let value = sim.read("temperature", 15_000).unwrap();
        assert!((value - 21.0).abs() < 1e-9);
        assert_eq!(sim.truth("temperature", 5_000), Some(20.0));
        assert_eq!(sim.read("ph", 15_000), None);
    }
}
