//! Stress tests for CFE-HYDRO
//!
//! Run with: cargo test --release stress -- --ignored

use cfe_hydro::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn hydro_sender(seed: u64) -> Sender {
    let registry = Arc::new(SignalRegistry::hydroponics());
    Sender::with_subsampler(
        SenderConfig::with_intervals(10_000, 60_000),
        registry,
        0,
        Subsampler::seeded(SparsityPolicy::default(), seed),
    )
    .unwrap()
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_sender_week() {
    let mut sender = hydro_sender(1);
    let start = Instant::now();

    // A week of 10 s samples on four signals
    let steps = 7 * 8_640u64;
    let mut packets = 0;
    for step in 0..steps {
        let t = step * 10_000;
        let x = step as f64 * 1e-3;
        for (id, value) in [
            ("temperature", 21.0 + x.sin()),
            ("ph", 6.0 + 0.1 * x.cos()),
            ("ec", 1.6 + 0.01 * x),
            ("do", 8.0 - 0.01 * x),
        ] {
            if sender.push(Reading::new(id, value, t)).unwrap().is_some() {
                packets += 1;
            }
        }
    }

    let elapsed = start.elapsed();
    let rate = (steps * 4) as f64 / elapsed.as_secs_f64();

    println!("Sent {} packets from {} readings in {:?}", packets, steps * 4, elapsed);
    println!("Rate: {:.0} readings/second", rate);

    assert_eq!(packets, steps / 6 - 1);
    assert!(
        rate > 100_000.0,
        "Should accumulate at least 100k readings/s, got {:.0}",
        rate
    );
}

#[test]
#[ignore]
fn stress_test_reconstruct_long_history() {
    let config = ReconstructorConfig::hydroponics();
    let mut state = ReconstructionState::new("ph", InterpolationHint::Logarithmic, &config);

    let samples = 5_000u64;
    let start = Instant::now();
    for i in 0..samples {
        let t = i * 20_000;
        let v = 5.8 + 0.3 * (1.0 + t as f64 / 60_000.0).ln();
        assert!(state.insert(t, v).accepted());
    }
    let elapsed = start.elapsed();

    println!("Refit {} times in {:?}", samples, elapsed);
    assert_eq!(*state.status(), FitStatus::Fitted);
    assert!(
        elapsed < Duration::from_secs(120),
        "Incremental refit too slow: {:?}",
        elapsed
    );
}

#[test]
#[ignore]
fn stress_test_lossy_pipeline() {
    let broker = MemoryBroker::new();
    let config = SessionConfig {
        reconnect: ReconnectPolicy::fixed(Duration::from_secs(1)),
        max_consecutive_failures: 1_000_000,
    };
    let mut uplink = TransportSession::new(
        LossyLink::with_seed(broker.link(), 0.3, 99),
        DEFAULT_TOPIC,
        config,
    );
    let mut downlink =
        TransportSession::new(broker.subscribe(DEFAULT_TOPIC), DEFAULT_TOPIC, SessionConfig::default());
    let mut hub = ReconstructionHub::new(ReconstructorConfig::hydroponics());
    let mut sender = hydro_sender(2);
    let clock = Instant::now();

    let steps = 8_640u64;
    let start = Instant::now();
    for step in 0..steps {
        let t = step * 10_000;
        let now = clock + Duration::from_millis(t);
        uplink.tick(now);
        for (id, value) in [("ph", 6.0 + (step as f64 * 1e-3).sin() * 0.2), ("ec", 1.6)] {
            if let Some(out) = sender.push(Reading::new(id, value, t)).unwrap() {
                uplink.offer(out.bytes);
                uplink.flush(now);
            }
        }
        for payload in downlink.receive(now).unwrap() {
            hub.ingest(&payload).unwrap();
        }
    }

    let stats = uplink.stats();
    println!(
        "Published {}, failed {} in {:?}",
        stats.published,
        stats.failed,
        start.elapsed()
    );

    assert_eq!(hub.decoder().decoded(), stats.published);
    assert!(stats.failed > 0);
    assert!(hub.state("ph").is_some());
}
