//! Signal descriptor registry
//!
//! The set of monitored signals is static per deployment, so the registry
//! is built once at startup and never mutated afterwards. It is shared
//! read-only by the sender (subsampling, encoding) and may also be used by
//! a receiver that wants descriptor data without waiting for a packet.

use crate::error::{CfeError, Result};
use crate::protocol::InterpolationHint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static per-signal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    /// Unique key (`sensor_type` on the wire)
    pub signal_id: String,
    /// Physical unit label
    pub unit: String,
    /// Human-readable description
    pub description: String,
    /// Lower bound of the optimal range (reporting only)
    pub optimal_min: f64,
    /// Upper bound of the optimal range (reporting only)
    pub optimal_max: f64,
    /// Model the receiver should apply
    #[serde(default)]
    pub interpolation_hint: InterpolationHint,
}

impl SignalDescriptor {
    /// Create a descriptor
    pub fn new(
        signal_id: &str,
        unit: &str,
        description: &str,
        optimal: (f64, f64),
        interpolation_hint: InterpolationHint,
    ) -> Self {
        Self {
            signal_id: signal_id.to_string(),
            unit: unit.to_string(),
            description: description.to_string(),
            optimal_min: optimal.0,
            optimal_max: optimal.1,
            interpolation_hint,
        }
    }
}

/// Fixed registry of descriptors, indexed by signal id
#[derive(Debug, Clone, Default)]
pub struct SignalRegistry {
    descriptors: Vec<SignalDescriptor>,
    index: HashMap<String, usize>,
}

impl SignalRegistry {
    /// Build the registry
    ///
    /// Fails on an empty or duplicated signal id.
    pub fn new(descriptors: Vec<SignalDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, descriptor) in descriptors.iter().enumerate() {
            if descriptor.signal_id.is_empty() {
                return Err(CfeError::Config(format!(
                    "descriptor #{} has an empty signal id",
                    i
                )));
            }
            if index.insert(descriptor.signal_id.clone(), i).is_some() {
                return Err(CfeError::Config(format!(
                    "duplicate signal id '{}'",
                    descriptor.signal_id
                )));
            }
        }
        Ok(Self { descriptors, index })
    }

    /// Hydroponic nutrient-solution deployment: temperature, pH,
    /// electrical conductivity and dissolved oxygen
    pub fn hydroponics() -> Self {
        let descriptors = hydroponics_descriptors();
        let index = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.signal_id.clone(), i))
            .collect();
        Self { descriptors, index }
    }

    /// Look up a descriptor by signal id
    pub fn get(&self, signal_id: &str) -> Option<&SignalDescriptor> {
        self.index.get(signal_id).map(|&i| &self.descriptors[i])
    }

    /// Position of a signal in registration order
    pub fn position(&self, signal_id: &str) -> Option<usize> {
        self.index.get(signal_id).copied()
    }

    /// Whether a signal is registered
    pub fn contains(&self, signal_id: &str) -> bool {
        self.index.contains_key(signal_id)
    }

    /// Descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.descriptors.iter()
    }

    /// Number of registered signals
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Descriptors of the reference hydroponics deployment
pub fn hydroponics_descriptors() -> Vec<SignalDescriptor> {
    vec![
        SignalDescriptor::new(
            "temperature",
            "°C",
            "Nutrient solution temperature",
            (18.0, 25.0),
            InterpolationHint::Linear,
        ),
        SignalDescriptor::new(
            "ph",
            "pH",
            "Hydrogen potential",
            (5.5, 6.5),
            InterpolationHint::Logarithmic,
        ),
        SignalDescriptor::new(
            "ec",
            "mS/cm",
            "Electrical conductivity",
            (1.0, 3.0),
            InterpolationHint::Polynomial,
        ),
        SignalDescriptor::new(
            "do",
            "mg/L",
            "Dissolved oxygen",
            (5.0, 8.0),
            InterpolationHint::Polynomial,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = SignalRegistry::hydroponics();
        assert_eq!(registry.len(), 4);
        let ph = registry.get("ph").unwrap();
        assert_eq!(ph.interpolation_hint, InterpolationHint::Logarithmic);
        assert_eq!(registry.position("ec"), Some(2));
        assert!(registry.get("orp").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let d = SignalDescriptor::new("ph", "", "", (5.5, 7.0), InterpolationHint::Linear);
        let result = SignalRegistry::new(vec![d.clone(), d]);
        assert!(matches!(result, Err(CfeError::Config(_))));
    }

    #[test]
    fn test_registry_rejects_empty_id() {
        let d = SignalDescriptor::new("", "", "", (0.0, 1.0), InterpolationHint::Linear);
        assert!(SignalRegistry::new(vec![d]).is_err());
    }

    #[test]
    fn test_descriptor_deserialize_defaults_hint() {
        let json = r#"{"signal_id":"t","unit":"C","description":"x","optimal_min":1,"optimal_max":2}"#;
        let d: SignalDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.interpolation_hint, InterpolationHint::Linear);
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = SignalRegistry::hydroponics();
        let ids: Vec<_> = registry.iter().map(|d| d.signal_id.as_str()).collect();
        assert_eq!(ids, vec!["temperature", "ph", "ec", "do"]);
    }
}
