// CFE-HYDRO Node - Prometheus metrics definitions
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Prometheus metrics for the node.
//!
//! Sender-side gauges track windows and the publishing session; receiver
//! gauges are labelled per signal and follow each reconstruction.

use cfe_hydro::{ReconstructionState, SessionState, SessionStats};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_gauge, Encoder, Gauge,
    GaugeVec, IntCounter, IntGauge, TextEncoder,
};
use tracing::warn;

lazy_static! {
    // ============================================================
    // Sender
    // ============================================================

    /// Transmission windows closed by the accumulator.
    pub static ref WINDOWS_CLOSED: IntGauge = register_int_gauge!(
        "cfe_windows_closed",
        "Transmission windows closed by the accumulator"
    ).unwrap();

    /// Readings dropped by the encoder (unknown signal, non-finite value).
    pub static ref ENCODE_DROPS: IntCounter = register_int_counter!(
        "cfe_encode_dropped_readings_total",
        "Readings dropped while encoding"
    ).unwrap();

    /// Packets replaced in the mailbox before the publisher took them.
    pub static ref MAILBOX_STALE: IntGauge = register_int_gauge!(
        "cfe_mailbox_stale_drops",
        "Packets replaced in the mailbox before publish"
    ).unwrap();

    // ============================================================
    // Session
    // ============================================================

    /// Session state (0=Disconnected, 1=Connecting, 2=Connected).
    pub static ref SESSION_STATE: IntGauge = register_int_gauge!(
        "cfe_session_state",
        "Publishing session state (0=Disconnected, 1=Connecting, 2=Connected)"
    ).unwrap();

    pub static ref PACKETS_PUBLISHED: IntGauge = register_int_gauge!(
        "cfe_packets_published",
        "Packets published successfully"
    ).unwrap();

    pub static ref PUBLISH_FAILURES: IntGauge = register_int_gauge!(
        "cfe_publish_failures",
        "Publish attempts that failed"
    ).unwrap();

    pub static ref SESSION_STALE: IntGauge = register_int_gauge!(
        "cfe_session_stale_drops",
        "Pending packets replaced by a newer one"
    ).unwrap();

    pub static ref RECONNECT_ATTEMPTS: IntGauge = register_int_gauge!(
        "cfe_reconnect_attempts",
        "Connect attempts made by the publishing session"
    ).unwrap();

    // ============================================================
    // Receiver
    // ============================================================

    /// Packets rejected by the decoder.
    pub static ref PACKETS_REJECTED: IntCounter = register_int_counter!(
        "cfe_packets_rejected_total",
        "Received packets rejected as malformed"
    ).unwrap();

    pub static ref SIGNAL_SAMPLES: GaugeVec = register_gauge_vec!(
        "cfe_signal_samples",
        "Samples held by a signal's reconstruction",
        &["signal"]
    ).unwrap();

    pub static ref SIGNAL_RMSE: GaugeVec = register_gauge_vec!(
        "cfe_signal_rmse",
        "In-sample RMSE of the current fit",
        &["signal"]
    ).unwrap();

    pub static ref SIGNAL_R2: GaugeVec = register_gauge_vec!(
        "cfe_signal_r2",
        "In-sample R squared of the current fit",
        &["signal"]
    ).unwrap();

    /// Latest estimate, at the newest sample time.
    pub static ref SIGNAL_ESTIMATE: GaugeVec = register_gauge_vec!(
        "cfe_signal_estimate",
        "Reconstructed value at the newest sample",
        &["signal"]
    ).unwrap();

    pub static ref NODE_UP: Gauge = register_gauge!(
        "cfe_node_up",
        "1 while the node runtime is running"
    ).unwrap();
}

fn state_code(state: SessionState) -> i64 {
    match state {
        SessionState::Disconnected => 0,
        SessionState::Connecting => 1,
        SessionState::Connected => 2,
    }
}

/// Update session gauges.
pub fn update_session(state: SessionState, stats: &SessionStats) {
    SESSION_STATE.set(state_code(state));
    PACKETS_PUBLISHED.set(stats.published as i64);
    PUBLISH_FAILURES.set(stats.failed as i64);
    SESSION_STALE.set(stats.dropped_stale as i64);
    RECONNECT_ATTEMPTS.set(stats.reconnect_attempts as i64);
}

/// Update per-signal gauges from one reconstruction.
pub fn update_signal(state: &ReconstructionState) {
    let label = [state.signal_id()];
    SIGNAL_SAMPLES
        .with_label_values(&label)
        .set(state.len() as f64);
    if let Some(quality) = state.metrics().latest() {
        SIGNAL_RMSE.with_label_values(&label).set(quality.rmse);
        if let Some(r2) = quality.r2 {
            SIGNAL_R2.with_label_values(&label).set(r2);
        }
    }
    if let Some((_, newest)) = state.time_range() {
        if let Ok(value) = state.estimate(newest) {
            SIGNAL_ESTIMATE.with_label_values(&label).set(value);
        }
    }
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfe_hydro::{InterpolationHint, ReconstructorConfig, TransmittedReading};

    #[test]
    fn test_state_codes() {
        assert_eq!(state_code(SessionState::Disconnected), 0);
        assert_eq!(state_code(SessionState::Connected), 2);
    }

    #[test]
    fn test_encode_metrics() {
        update_session(SessionState::Connected, &SessionStats::default());

        let mut state = ReconstructionState::new(
            "probe",
            InterpolationHint::Linear,
            &ReconstructorConfig::default(),
        );
        for (t, v) in [(0u64, 20.0), (10_000, 21.0)] {
            state.apply(&TransmittedReading {
                signal_id: "probe".to_string(),
                value: v,
                sample_time: t,
                interpolation_hint: InterpolationHint::Linear,
                unit: "°C".to_string(),
                description: "Water temperature".to_string(),
                optimal_min: 18.0,
                optimal_max: 24.0,
            });
        }
        update_signal(&state);

        let output = encode_metrics();
        assert!(output.contains("cfe_session_state"));
        assert!(output.contains("cfe_signal_samples{signal=\"probe\"} 2"));
    }
}
