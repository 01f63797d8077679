// CFE-HYDRO - Compressive field estimation telemetry
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.


//! Transport session state machine
//!
//! The session wraps a [`Transport`] and owns the connect/publish/reconnect
//! cycle. It never sleeps: the owner calls [`TransportSession::tick`] with
//! the current instant and the session decides whether a reconnect attempt
//! is due. That keeps the waiting out of the accumulation path entirely.
//!
//! At most one packet is pending. Offering a new one replaces the old one,
//! and a failed publish abandons the packet instead of retrying it.

use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::transport::{Transport, TransportResult};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link; a reconnect attempt is scheduled
    Disconnected,
    /// A connect attempt is in progress
    Connecting,
    /// Link open
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Packets published
    pub published: u64,
    /// Packets abandoned after a failed publish
    pub failed: u64,
    /// Pending packets replaced by a newer one before they were sent
    pub dropped_stale: u64,
    /// Connect attempts, successful or not
    pub reconnect_attempts: u64,
    /// Transitions from Connected to Disconnected
    pub disconnects: u64,
}

/// What a flush did with the pending packet
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// The pending packet was published
    Published,
    /// Not connected; the packet stays pending
    Held,
    /// Publish failed; the packet was abandoned
    Failed(TransportError),
}

/// Publish/subscribe session with reconnect backoff
#[derive(Debug)]
pub struct TransportSession<T: Transport> {
    transport: T,
    topic: String,
    config: SessionConfig,
    state: SessionState,
    consecutive_failures: u32,
    /// Failed connect attempts since the last successful connect
    attempt: u32,
    next_attempt: Option<Instant>,
    pending: Option<Vec<u8>>,
    inbox: VecDeque<Vec<u8>>,
    stats: SessionStats,
}

impl<T: Transport> TransportSession<T> {
    /// Create a disconnected session; the first tick attempts to connect
    pub fn new(transport: T, topic: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            transport,
            topic: topic.into(),
            config,
            state: SessionState::Disconnected,
            consecutive_failures: 0,
            attempt: 0,
            next_attempt: None,
            pending: None,
            inbox: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is connected
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Topic packets are published on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// When the next reconnect attempt is due, if disconnected
    pub fn next_attempt(&self) -> Option<Instant> {
        match self.state {
            SessionState::Connected => None,
            _ => self.next_attempt,
        }
    }

    /// Whether a packet is waiting to be published
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Advance the state machine
    ///
    /// While disconnected, makes at most one connect attempt, and only once
    /// the retry delay has elapsed. While connected, polls the link; a poll
    /// failure drops the session to Disconnected.
    pub fn tick(&mut self, now: Instant) -> SessionState {
        match self.state {
            SessionState::Disconnected | SessionState::Connecting => {
                if self.next_attempt.map_or(true, |due| now >= due) {
                    self.try_connect(now);
                }
            }
            SessionState::Connected => match self.transport.poll() {
                Ok(received) => self.inbox.extend(received),
                Err(e) => {
                    warn!("keepalive on {} failed: {}", self.topic, e);
                    self.enter_disconnected(now);
                }
            },
        }
        self.state
    }

    fn try_connect(&mut self, now: Instant) {
        self.state = SessionState::Connecting;
        self.stats.reconnect_attempts += 1;
        match self.transport.connect() {
            Ok(()) => {
                info!(
                    "connected to {} after {} failed attempts",
                    self.topic, self.attempt
                );
                self.state = SessionState::Connected;
                self.attempt = 0;
                self.consecutive_failures = 0;
                self.next_attempt = None;
            }
            Err(e) => {
                let delay = self.config.reconnect.delay_for_attempt(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                self.next_attempt = Some(now + delay);
                self.state = SessionState::Disconnected;
                debug!("connect failed ({}); next attempt in {:?}", e, delay);
            }
        }
    }

    fn enter_disconnected(&mut self, now: Instant) {
        if self.state == SessionState::Connected {
            self.stats.disconnects += 1;
        }
        warn!("session on {} disconnected", self.topic);
        self.transport.disconnect();
        self.state = SessionState::Disconnected;
        self.consecutive_failures = 0;
        self.attempt = 0;
        // First reconnect attempt on the next tick, then back off.
        self.next_attempt = Some(now);
    }

    /// Make `packet` the pending packet, returning the one it displaced
    pub fn offer(&mut self, packet: Vec<u8>) -> Option<Vec<u8>> {
        let displaced = self.pending.replace(packet);
        if displaced.is_some() {
            self.stats.dropped_stale += 1;
            debug!("stale packet on {} replaced before publish", self.topic);
        }
        displaced
    }

    /// Publish the pending packet, if any
    ///
    /// A failure abandons the packet. After `max_consecutive_failures`
    /// failures in a row, or as soon as the link itself reports closed, the
    /// session drops to Disconnected.
    pub fn flush(&mut self, now: Instant) -> FlushOutcome {
        if self.pending.is_none() {
            return FlushOutcome::Idle;
        }
        if self.state != SessionState::Connected {
            return FlushOutcome::Held;
        }
        let Some(packet) = self.pending.take() else {
            return FlushOutcome::Idle;
        };

        match self.transport.publish(&self.topic, &packet) {
            Ok(()) => {
                self.stats.published += 1;
                self.consecutive_failures = 0;
                FlushOutcome::Published
            }
            Err(e) => {
                self.stats.failed += 1;
                self.consecutive_failures += 1;
                warn!(
                    "publish on {} failed ({} in a row): {}",
                    self.topic, self.consecutive_failures, e
                );
                if self.consecutive_failures >= self.config.max_consecutive_failures
                    || !self.transport.is_connected()
                {
                    self.enter_disconnected(now);
                }
                FlushOutcome::Failed(e)
            }
        }
    }

    /// Offer a packet, advance the state machine and flush
    pub fn send(&mut self, packet: Vec<u8>, now: Instant) -> FlushOutcome {
        self.offer(packet);
        self.tick(now);
        self.flush(now)
    }

    /// Payloads received on the link since the last call
    pub fn take_received(&mut self) -> Vec<Vec<u8>> {
        self.inbox.drain(..).collect()
    }

    /// Poll immediately and return everything received
    pub fn receive(&mut self, now: Instant) -> TransportResult<Vec<Vec<u8>>> {
        match self.tick(now) {
            SessionState::Connected => Ok(self.take_received()),
            _ => Err(TransportError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::ReconnectPolicy;
    use crate::transport::{MemoryBroker, ScriptedTransport};
    use std::time::Duration;

    fn config() -> SessionConfig {
        SessionConfig {
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(5)),
            max_consecutive_failures: 3,
        }
    }

    #[test]
    fn test_first_tick_connects() {
        let mut session = TransportSession::new(ScriptedTransport::new(), "t", config());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.tick(Instant::now()), SessionState::Connected);
        assert_eq!(session.stats().reconnect_attempts, 1);
    }

    #[test]
    fn test_three_failures_disconnect() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new().fail_publishes(3);
        let mut session = TransportSession::new(transport, "t", config());
        session.tick(t0);

        for i in 0..3u64 {
            let now = t0 + Duration::from_secs(i);
            let outcome = session.send(vec![i as u8], now);
            assert!(matches!(outcome, FlushOutcome::Failed(_)));
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.stats().failed, 3);
        assert_eq!(session.stats().disconnects, 1);
        assert!(!session.has_pending());
    }

    #[test]
    fn test_two_failures_stay_connected() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new()
            .then_publish(false)
            .then_publish(false)
            .then_publish(true)
            .then_publish(false);
        let mut session = TransportSession::new(transport, "t", config());
        session.tick(t0);

        for i in 0..4u8 {
            session.send(vec![i], t0);
        }
        assert!(session.is_connected());
        assert_eq!(session.stats().published, 1);
        assert_eq!(session.stats().failed, 3);
    }

    #[test]
    fn test_one_reconnect_attempt_per_interval() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new().fail_connects(100);
        let mut session = TransportSession::new(transport, "t", config());

        // Tick every second for 30 s: attempts at 0, 5, 10, 15, 20, 25.
        for s in 0..30 {
            session.tick(t0 + Duration::from_secs(s));
        }
        assert_eq!(session.transport().connect_attempts(), 6);
        assert_eq!(session.stats().reconnect_attempts, 6);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.next_attempt(), Some(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_exponential_reconnect_schedule() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new().fail_connects(100);
        let cfg = SessionConfig {
            reconnect: ReconnectPolicy::exponential(Duration::from_secs(1)),
            max_consecutive_failures: 3,
        };
        let mut session = TransportSession::new(transport, "t", cfg);

        // Attempts at 0, 1, 3, 7, 15 s.
        for s in 0..16 {
            session.tick(t0 + Duration::from_secs(s));
        }
        assert_eq!(session.transport().connect_attempts(), 5);
    }

    #[test]
    fn test_latest_wins_while_disconnected() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new().fail_connects(1);
        let mut session = TransportSession::new(transport, "t", config());
        session.tick(t0);

        assert!(session.offer(b"old".to_vec()).is_none());
        assert_eq!(session.flush(t0), FlushOutcome::Held);
        assert_eq!(session.offer(b"new".to_vec()), Some(b"old".to_vec()));
        assert_eq!(session.stats().dropped_stale, 1);

        session.tick(t0 + Duration::from_secs(5));
        assert_eq!(session.flush(t0 + Duration::from_secs(5)), FlushOutcome::Published);
        assert_eq!(session.transport().published()[0].1, b"new".to_vec());
    }

    #[test]
    fn test_poll_failure_disconnects() {
        let t0 = Instant::now();
        let transport = ScriptedTransport::new().fail_next_poll();
        let mut session = TransportSession::new(transport, "t", config());
        session.tick(t0);
        assert_eq!(session.tick(t0), SessionState::Disconnected);
        // Immediate retry on the next tick
        assert_eq!(session.tick(t0), SessionState::Connected);
    }

    #[test]
    fn test_closed_link_disconnects_on_first_failure() {
        let t0 = Instant::now();
        let broker = MemoryBroker::new();
        let mut publisher = TransportSession::new(broker.link(), "t", config());
        publisher.tick(t0);

        broker.set_online(false);
        publisher.offer(b"x".to_vec());
        assert!(matches!(publisher.flush(t0), FlushOutcome::Failed(_)));
        assert_eq!(publisher.state(), SessionState::Disconnected);
        assert_eq!(publisher.stats().failed, 1);
    }

    #[test]
    fn test_broker_outage_and_recovery() {
        let t0 = Instant::now();
        let broker = MemoryBroker::new();
        let mut subscriber = TransportSession::new(broker.subscribe("t"), "t", config());
        let mut publisher = TransportSession::new(broker.link(), "t", config());
        subscriber.tick(t0);

        assert_eq!(publisher.send(b"1".to_vec(), t0), FlushOutcome::Published);

        // Keepalive notices the outage before the publish is attempted.
        broker.set_online(false);
        assert_eq!(publisher.send(b"2".to_vec(), t0), FlushOutcome::Held);
        assert_eq!(publisher.state(), SessionState::Disconnected);

        broker.set_online(true);
        let later = t0 + Duration::from_secs(1);
        assert_eq!(publisher.send(b"3".to_vec(), later), FlushOutcome::Published);
        assert_eq!(publisher.stats().dropped_stale, 1);

        let received = subscriber.receive(later).unwrap();
        assert_eq!(received, vec![b"1".to_vec(), b"3".to_vec()]);
    }
}
