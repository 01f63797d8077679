// CFE-HYDRO Node - Task runtime
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Concurrent node runtime.
//!
//! Three kinds of task share no mutable state:
//!
//! - the accumulator samples the sensor on the sampling interval, closes
//!   windows and drops encoded packets into a latest-wins [`Mailbox`];
//! - the publisher drives the sending [`TransportSession`], so reconnect
//!   backoff never delays sampling;
//! - the receiver polls the subscribing session, decodes packets and
//!   forwards each reading over `mpsc` to the worker that owns that
//!   signal's [`ReconstructionState`].
//!
//! Node time runs `speed` times faster than the tokio clock.

use crate::error::{NodeError, NodeResult};
use crate::mailbox::Mailbox;
use crate::metrics;
use crate::sensor::NodeSensor;
use cfe_hydro::{
    Decoder, DeploymentConfig, FlushOutcome, ReconstructionState, ReconstructorConfig, Sender,
    SenderOutput, SessionStats, Subsampler, SystemInfo, TimestampMs, Transport,
    TransmittedReading, TransportSession, DEFAULT_TOPIC,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Readings buffered per signal worker
const WORKER_QUEUE: usize = 64;

/// Maps the tokio clock onto node milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct NodeClock {
    origin: Instant,
    origin_ms: TimestampMs,
    speed: f64,
}

impl NodeClock {
    /// Start the clock now, reading `origin_ms`.
    pub fn start(origin_ms: TimestampMs, speed: f64) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
            speed,
        }
    }

    /// Current node time.
    pub fn now_ms(&self) -> TimestampMs {
        let elapsed = self.origin.elapsed().as_secs_f64() * 1000.0 * self.speed;
        self.origin_ms + elapsed.round() as u64
    }

    /// Wall time that `node_ms` of node time takes.
    pub fn wall(&self, node_ms: u64) -> Duration {
        Duration::from_secs_f64(node_ms as f64 / 1000.0 / self.speed)
    }
}

/// Runtime options.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub deployment: DeploymentConfig,
    pub topic: String,
    /// Node time per unit of wall time.
    pub speed: f64,
    /// Wall-clock period of the publisher and receiver loops.
    pub poll_interval: Duration,
    /// Seed for the subsampler; entropy when `None`.
    pub subsample_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            deployment: DeploymentConfig::default(),
            topic: DEFAULT_TOPIC.to_string(),
            speed: 1.0,
            poll_interval: Duration::from_millis(500),
            subsample_seed: None,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> NodeResult<()> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(NodeError::InvalidOption(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(NodeError::InvalidOption(
                "poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sample until shutdown or until the source runs dry.
///
/// Returns the number of windows closed.
pub async fn run_accumulator<S: NodeSensor>(
    mut sender: Sender,
    mut source: S,
    mailbox: Arc<Mailbox<SenderOutput>>,
    clock: NodeClock,
    mut shutdown: watch::Receiver<bool>,
) -> NodeResult<u64> {
    let start = source.start_ms();
    let mut ticker = time::interval(clock.wall(sender.config().sampling_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let now = clock.now_ms();
        if !source.seek(now) {
            info!("Sensor source exhausted at {}", now);
            break;
        }
        sender.set_system_info(SystemInfo {
            uptime: now.saturating_sub(start) / 1000,
            ..SystemInfo::default()
        });
        if let Some(output) = sender.sample(&mut source, now)? {
            debug!(
                "window #{} encoded, {} bytes",
                output.window_sequence,
                output.bytes.len()
            );
            metrics::ENCODE_DROPS.inc_by(output.dropped.len() as u64);
            if mailbox.put(output) {
                debug!("publisher behind; older packet replaced");
            }
            metrics::MAILBOX_STALE.set(mailbox.stale_drops() as i64);
        }
        metrics::WINDOWS_CLOSED.set(sender.windows_closed() as i64);
    }

    Ok(sender.windows_closed())
}

fn publish_step<T: Transport>(session: &mut TransportSession<T>) {
    let now = Instant::now().into_std();
    session.tick(now);
    match session.flush(now) {
        FlushOutcome::Published => debug!("packet published on {}", session.topic()),
        FlushOutcome::Failed(e) => warn!("packet abandoned: {}", e),
        FlushOutcome::Held | FlushOutcome::Idle => {}
    }
    metrics::update_session(session.state(), &session.stats());
}

/// Publish mailbox packets until shutdown.
pub async fn run_publisher<T: Transport>(
    mut session: TransportSession<T>,
    mailbox: Arc<Mailbox<SenderOutput>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> SessionStats {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            output = mailbox.take() => {
                session.offer(output.bytes);
            }
            _ = ticker.tick() => {}
        }
        publish_step(&mut session);
    }

    // Last window closed before shutdown
    if let Some(output) = mailbox.try_take() {
        session.offer(output.bytes);
        publish_step(&mut session);
    }
    session.stats()
}

/// What the receiver saw.
#[derive(Debug, Clone)]
pub struct ReceiverReport {
    /// Final per-signal states, sorted by signal id.
    pub states: Vec<ReconstructionState>,
    pub decoded: u64,
    pub rejected: u64,
    pub session: SessionStats,
}

impl ReceiverReport {
    pub fn state(&self, signal_id: &str) -> Option<&ReconstructionState> {
        self.states.iter().find(|s| s.signal_id() == signal_id)
    }
}

async fn signal_worker(
    mut state: ReconstructionState,
    mut rx: mpsc::Receiver<TransmittedReading>,
) -> ReconstructionState {
    while let Some(reading) = rx.recv().await {
        if state.apply(&reading).accepted() {
            metrics::update_signal(&state);
        }
    }
    state
}

struct Workers {
    config: ReconstructorConfig,
    senders: HashMap<String, mpsc::Sender<TransmittedReading>>,
    handles: Vec<JoinHandle<ReconstructionState>>,
}

impl Workers {
    fn new(config: ReconstructorConfig) -> Self {
        Self {
            config,
            senders: HashMap::new(),
            handles: Vec::new(),
        }
    }

    async fn route(&mut self, reading: TransmittedReading) {
        let tx = match self.senders.get(&reading.signal_id) {
            Some(tx) => tx.clone(),
            None => {
                info!(
                    "New signal {} ({})",
                    reading.signal_id, reading.interpolation_hint
                );
                let state = ReconstructionState::new(
                    reading.signal_id.as_str(),
                    reading.interpolation_hint,
                    &self.config,
                );
                let (tx, rx) = mpsc::channel(WORKER_QUEUE);
                self.handles.push(tokio::spawn(signal_worker(state, rx)));
                self.senders.insert(reading.signal_id.clone(), tx.clone());
                tx
            }
        };
        if let Err(e) = tx.send(reading).await {
            warn!("worker for {} is gone", e.0.signal_id);
        }
    }

    async fn finish(self) -> NodeResult<Vec<ReconstructionState>> {
        drop(self.senders);
        let mut states = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            states.push(handle.await?);
        }
        states.sort_by(|a, b| a.signal_id().cmp(b.signal_id()));
        Ok(states)
    }
}

/// Receive, decode and fan out until shutdown.
pub async fn run_receiver<T: Transport>(
    mut session: TransportSession<T>,
    config: ReconstructorConfig,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> NodeResult<ReceiverReport> {
    let mut decoder = Decoder::new();
    let mut workers = Workers::new(config);
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stopping = tokio::select! {
            _ = shutdown.changed() => true,
            _ = ticker.tick() => false,
        };

        session.tick(Instant::now().into_std());
        for payload in session.take_received() {
            match decoder.decode(&payload) {
                Ok(packet) => {
                    for reading in packet.readings {
                        workers.route(reading).await;
                    }
                }
                // The decoder has already logged why
                Err(_) => metrics::PACKETS_REJECTED.inc(),
            }
        }

        if stopping {
            break;
        }
    }

    Ok(ReceiverReport {
        states: workers.finish().await?,
        decoded: decoder.decoded(),
        rejected: decoder.rejected(),
        session: session.stats(),
    })
}

fn signal_stop(stop: &watch::Sender<bool>, tasks: &str) {
    if stop.send(true).is_err() {
        debug!("{} already stopped", tasks);
    }
}

/// Summary of one node run.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub windows_closed: u64,
    pub publisher: SessionStats,
    pub mailbox_stale: u64,
    pub receiver: ReceiverReport,
}

/// Run sender and receiver side by side for `run_for` of wall time, or
/// until the sensor source runs dry.
///
/// Shutdown is staged: the accumulator and publisher stop first, then the
/// receiver drains its link and hands back the worker states. Every task
/// is stopped and joined before any task's error is returned.
pub async fn run_node<S, U, D>(
    config: &NodeConfig,
    sensor: S,
    uplink: U,
    downlink: D,
    run_for: Duration,
) -> NodeResult<NodeReport>
where
    S: NodeSensor + 'static,
    U: Transport + Send + 'static,
    D: Transport + Send + 'static,
{
    config.validate()?;
    let deployment = &config.deployment;
    let registry = Arc::new(deployment.build_registry()?);
    let start = sensor.start_ms();
    let sender = match config.subsample_seed {
        Some(seed) => Sender::with_subsampler(
            deployment.sender.clone(),
            registry,
            start,
            Subsampler::seeded(deployment.sender.sparsity, seed),
        )?,
        None => Sender::new(deployment.sender.clone(), registry, start)?,
    };

    let clock = NodeClock::start(start, config.speed);
    let mailbox = Arc::new(Mailbox::new());
    let (stop_sender, sender_shutdown) = watch::channel(false);
    let (stop_receiver, receiver_shutdown) = watch::channel(false);
    metrics::NODE_UP.set(1.0);

    let receiver = tokio::spawn(run_receiver(
        TransportSession::new(downlink, config.topic.clone(), deployment.session.clone()),
        deployment.reconstructor.clone(),
        config.poll_interval,
        receiver_shutdown,
    ));
    let publisher = tokio::spawn(run_publisher(
        TransportSession::new(uplink, config.topic.clone(), deployment.session.clone()),
        Arc::clone(&mailbox),
        config.poll_interval,
        sender_shutdown.clone(),
    ));
    let mut accumulator = tokio::spawn(run_accumulator(
        sender,
        sensor,
        Arc::clone(&mailbox),
        clock,
        sender_shutdown,
    ));

    info!("Node running for {:?} at {}x", run_for, config.speed);
    let finished = tokio::select! {
        result = &mut accumulator => Some(result),
        _ = time::sleep(run_for) => None,
    };

    signal_stop(&stop_sender, "accumulator and publisher");
    let accumulated = match finished {
        Some(result) => result,
        None => accumulator.await,
    };
    let published = publisher.await;

    // Let the receiver pick up the final publish; skip the wait if the
    // sending side failed
    if accumulated.as_ref().is_ok_and(|r| r.is_ok()) && published.is_ok() {
        time::sleep(config.poll_interval).await;
    }
    signal_stop(&stop_receiver, "receiver");
    let received = receiver.await;
    metrics::NODE_UP.set(0.0);

    let windows_closed = accumulated??;
    let publisher = published?;
    let receiver = received??;

    info!(
        "Node stopped: {} windows, {} published, {} failed, {} signals reconstructed",
        windows_closed,
        publisher.published,
        publisher.failed,
        receiver.states.len()
    );

    Ok(NodeReport {
        windows_closed,
        publisher,
        mailbox_stale: mailbox.stale_drops(),
        receiver,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SimulatedSensor;
    use cfe_hydro::{
        MemoryBroker, ScriptedTransport, SenderConfig, SensorError, SensorSource, SparsityPolicy,
        TransportMetrics, TransportResult,
    };
    use cfe_hydro_testdata::hydroponics::{create_hydroponic_sensors, HydroponicScenario};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sensor whose bus dies after a few passes
    struct DyingSensor {
        inner: SimulatedSensor,
        passes_left: u32,
    }

    impl SensorSource for DyingSensor {
        fn read(&mut self, signal_id: &str) -> Result<f64, SensorError> {
            self.inner.read(signal_id)
        }
    }

    impl NodeSensor for DyingSensor {
        fn seek(&mut self, now_ms: TimestampMs) -> bool {
            if self.passes_left == 0 {
                panic!("sensor bus fault");
            }
            self.passes_left -= 1;
            self.inner.seek(now_ms)
        }

        fn start_ms(&self) -> TimestampMs {
            self.inner.start_ms()
        }
    }

    /// Link that reports when its owner drops it
    struct WatchedLink<T> {
        inner: T,
        dropped: Arc<AtomicBool>,
    }

    impl<T: Transport> Transport for WatchedLink<T> {
        fn connect(&mut self) -> TransportResult<()> {
            self.inner.connect()
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
            self.inner.publish(topic, payload)
        }

        fn poll(&mut self) -> TransportResult<Vec<Vec<u8>>> {
            self.inner.poll()
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        fn disconnect(&mut self) {
            self.inner.disconnect()
        }

        fn metrics(&self) -> TransportMetrics {
            self.inner.metrics()
        }
    }

    impl<T> Drop for WatchedLink<T> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn config() -> NodeConfig {
        let mut config = NodeConfig {
            subsample_seed: Some(11),
            ..NodeConfig::default()
        };
        config.deployment.sender = SenderConfig {
            sparsity: SparsityPolicy::Ratio(0.5),
            ..SenderConfig::with_intervals(10_000, 60_000)
        };
        config
    }

    fn sensor() -> SimulatedSensor {
        SimulatedSensor::new(
            create_hydroponic_sensors(HydroponicScenario::Stable),
            0,
            Some(5),
        )
    }

    #[test]
    fn test_clock_scaling() {
        let clock = NodeClock::start(1_000, 10.0);
        assert_eq!(clock.wall(10_000), Duration::from_secs(1));
        assert!(clock.now_ms() >= 1_000);
    }

    #[test]
    fn test_config_validation() {
        let bad = NodeConfig {
            speed: 0.0,
            ..NodeConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_over_memory_broker() {
        let broker = MemoryBroker::new();
        let config = config();
        let downlink = broker.subscribe(&config.topic);
        let report = run_node(
            &config,
            sensor(),
            broker.link(),
            downlink,
            Duration::from_secs(630),
        )
        .await
        .unwrap();

        assert_eq!(report.windows_closed, 10);
        assert_eq!(report.publisher.published, 10);
        assert_eq!(report.receiver.decoded, 10);
        assert_eq!(report.receiver.rejected, 0);

        let ids: Vec<&str> = report.receiver.states.iter().map(|s| s.signal_id()).collect();
        assert_eq!(ids, vec!["do", "ec", "ph", "temperature"]);
        // Three of six readings per window
        assert_eq!(report.receiver.state("ph").unwrap().len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_uplink_does_not_stall_sampling() {
        let broker = MemoryBroker::new();
        let config = config();
        let downlink = broker.subscribe(&config.topic);
        let uplink = ScriptedTransport::new().fail_publishes(1_000);

        let report = run_node(
            &config,
            sensor(),
            uplink,
            downlink,
            Duration::from_secs(630),
        )
        .await
        .unwrap();

        assert_eq!(report.windows_closed, 10);
        assert_eq!(report.publisher.published, 0);
        assert_eq!(report.publisher.failed, 10);
        // Three failures per disconnect, each followed by a reconnect
        assert!(report.publisher.disconnects >= 3);
        assert!(report.receiver.states.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_accumulator_stops_receiver() {
        let broker = MemoryBroker::new();
        let config = config();
        let dropped = Arc::new(AtomicBool::new(false));
        let downlink = WatchedLink {
            inner: broker.subscribe(&config.topic),
            dropped: Arc::clone(&dropped),
        };
        let sensor = DyingSensor {
            inner: sensor(),
            passes_left: 3,
        };

        let result = run_node(
            &config,
            sensor,
            broker.link(),
            downlink,
            Duration::from_secs(630),
        )
        .await;

        assert!(matches!(result, Err(NodeError::Task(_))));
        // The receiver task finished and released its link
        assert!(dropped.load(Ordering::SeqCst));
    }
}
