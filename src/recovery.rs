// CFE-HYDRO - Compressive field estimation telemetry
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.


//! Reconnect backoff policies
//!
//! A disconnected session retries forever; the policy only decides how long
//! to wait before each attempt.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay schedule between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Constant delay between attempts
    Fixed {
        /// Delay between attempts (ms)
        delay_ms: u64,
    },
    /// Exponential backoff capped at `max_ms`
    Exponential {
        /// Delay before the second attempt (ms)
        initial_ms: u64,
        /// Upper bound on any delay (ms)
        max_ms: u64,
        /// Growth factor per attempt
        multiplier: f64,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        // The field devices retry every five seconds.
        Self::Fixed { delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential {
                initial_ms,
                max_ms,
                multiplier,
            } => {
                let exponent = attempt.min(63) as i32;
                let delay_ms = *initial_ms as f64 * multiplier.powi(exponent);
                let capped = if delay_ms.is_finite() {
                    delay_ms.min(*max_ms as f64)
                } else {
                    *max_ms as f64
                };
                Duration::from_millis(capped as u64)
            }
        }
    }

    /// Create a fixed policy
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Create a doubling policy capped at 60 s
    pub fn exponential(initial: Duration) -> Self {
        Self::Exponential {
            initial_ms: initial.as_millis() as u64,
            max_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed_five_seconds() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = ReconnectPolicy::Exponential {
            initial_ms: 100,
            max_ms: 10_000,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let policy = ReconnectPolicy::Exponential {
            initial_ms: 100,
            max_ms: 500,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        // Capped at max_ms
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_millis(500));
    }

    #[test]
    fn test_policy_helpers() {
        let fixed = ReconnectPolicy::fixed(Duration::from_millis(250));
        assert_eq!(fixed.delay_for_attempt(7), Duration::from_millis(250));

        let exp = ReconnectPolicy::exponential(Duration::from_millis(50));
        assert_eq!(exp.delay_for_attempt(1), Duration::from_millis(100));
    }

    #[test]
    fn test_policy_serde() {
        let json = r#"{"kind":"fixed","delay_ms":1500}"#;
        let policy: ReconnectPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, ReconnectPolicy::Fixed { delay_ms: 1500 });
    }
}
