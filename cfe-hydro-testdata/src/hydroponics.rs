// CFE-HYDRO Testdata - Hydroponic presets
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Nutrient-solution sensors of a hydroponic bed.
//!
//! Signal ids match the receiver's default registry: `temperature`, `ph`,
//! `ec` and `do`.

use crate::generator::SensorConfig;
use crate::patterns::SignalPattern;

/// Hydroponic scenario types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroponicScenario {
    /// Steady bed, slow drifts only.
    Stable,
    /// pH settling logarithmically after an acid dose.
    PhCorrection,
    /// Conductivity rising in a logistic step after a nutrient dose.
    NutrientDosing,
    /// Dissolved oxygen falling after an air pump failure.
    AerationFailure,
}

impl HydroponicScenario {
    pub const ALL: [HydroponicScenario; 4] = [
        HydroponicScenario::Stable,
        HydroponicScenario::PhCorrection,
        HydroponicScenario::NutrientDosing,
        HydroponicScenario::AerationFailure,
    ];
}

fn temperature() -> SensorConfig {
    SensorConfig::new(
        "temperature",
        "°C",
        -10.0,
        50.0,
        SignalPattern::Composite(vec![
            SignalPattern::Linear {
                start: 21.0,
                slope_per_ms: 2.0e-7, // +0.72 °C/h
            },
            SignalPattern::Sine {
                amplitude: 0.3,
                period_ms: 3_600_000,
                phase: 0.0,
                offset: 0.0,
            },
        ]),
    )
    .with_noise(0.05)
}

fn ph() -> SensorConfig {
    SensorConfig::new(
        "ph",
        "pH",
        0.0,
        14.0,
        SignalPattern::Logarithmic {
            start: 5.8,
            amplitude: 0.12,
            tau_ms: 60_000.0,
        },
    )
    .with_noise(0.02)
}

fn ec() -> SensorConfig {
    SensorConfig::new(
        "ec",
        "mS/cm",
        0.0,
        20.0,
        SignalPattern::Polynomial {
            coefficients: vec![1.6, -0.12, 0.03],
            time_scale_ms: 3_600_000.0,
        },
    )
    .with_noise(0.01)
}

fn dissolved_oxygen() -> SensorConfig {
    SensorConfig::new(
        "do",
        "mg/L",
        0.0,
        20.0,
        SignalPattern::Polynomial {
            coefficients: vec![8.2, -0.4, 0.1],
            time_scale_ms: 3_600_000.0,
        },
    )
    .with_noise(0.05)
}

/// Sensors of one bed for a scenario.
pub fn create_hydroponic_sensors(scenario: HydroponicScenario) -> Vec<SensorConfig> {
    let mut sensors = vec![temperature(), ph(), ec(), dissolved_oxygen()];

    match scenario {
        HydroponicScenario::Stable => {}
        HydroponicScenario::PhCorrection => {
            if let Some(sensor) = sensors.iter_mut().find(|s| s.id == "ph") {
                sensor.pattern = SignalPattern::Logarithmic {
                    start: 5.2,
                    amplitude: 0.45,
                    tau_ms: 20_000.0,
                };
            }
        }
        HydroponicScenario::NutrientDosing => {
            if let Some(sensor) = sensors.iter_mut().find(|s| s.id == "ec") {
                sensor.pattern = SignalPattern::Sigmoid {
                    floor: 1.2,
                    capacity: 0.8,
                    rate_per_ms: 1.0e-5,
                    midpoint_ms: 900_000.0,
                };
            }
        }
        HydroponicScenario::AerationFailure => {
            if let Some(sensor) = sensors.iter_mut().find(|s| s.id == "do") {
                sensor.pattern = SignalPattern::Decay {
                    start: 8.2,
                    target: 3.5,
                    tau_ms: 1_200_000.0,
                };
            }
        }
    }

    sensors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_have_four_sensors() {
        for scenario in HydroponicScenario::ALL {
            let sensors = create_hydroponic_sensors(scenario);
            let ids: Vec<&str> = sensors.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["temperature", "ph", "ec", "do"]);
        }
    }

    #[test]
    fn test_values_stay_in_range() {
        for scenario in HydroponicScenario::ALL {
            for sensor in create_hydroponic_sensors(scenario) {
                for t in (0..7_200_000).step_by(60_000) {
                    let v = sensor.true_value(t);
                    assert!(v >= sensor.min && v <= sensor.max, "{} at {}", sensor.id, t);
                }
            }
        }
    }

    #[test]
    fn test_dosing_raises_ec() {
        let sensors = create_hydroponic_sensors(HydroponicScenario::NutrientDosing);
        let ec = sensors.iter().find(|s| s.id == "ec").unwrap();
        assert!(ec.true_value(1_800_000) > ec.true_value(0) + 0.5);
    }
}
