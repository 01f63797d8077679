// CFE-HYDRO - Compressive field estimation telemetry
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.


//! Transport abstraction module
//!
//! This module provides the publish/subscribe link the session drives, an
//! in-process broker used by tests and simulations, and two test doubles.
//! Delivery guarantees are the transport's business; nothing here retries.

use crate::error::TransportError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Statistics about link usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportMetrics {
    /// Total bytes published
    pub bytes_sent: u64,
    /// Total messages published
    pub messages_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total messages received
    pub messages_received: u64,
    /// Publish calls that failed
    pub publish_failures: u64,
}

/// Trait for pub/sub links
pub trait Transport {
    /// Open the link
    fn connect(&mut self) -> TransportResult<()>;

    /// Publish one payload on a topic
    fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()>;

    /// Service the link: keepalive plus any payloads delivered to a
    /// subscription
    fn poll(&mut self) -> TransportResult<Vec<Vec<u8>>>;

    /// Whether the link believes it is open
    fn is_connected(&self) -> bool;

    /// Close the link
    fn disconnect(&mut self);

    /// Get link metrics
    fn metrics(&self) -> TransportMetrics;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> TransportResult<()> {
        (**self).connect()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        (**self).publish(topic, payload)
    }

    fn poll(&mut self) -> TransportResult<Vec<Vec<u8>>> {
        (**self).poll()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn metrics(&self) -> TransportMetrics {
        (**self).metrics()
    }
}

#[derive(Debug)]
struct Subscription {
    id: u64,
    topic: String,
    queue: VecDeque<Vec<u8>>,
}

#[derive(Debug)]
struct BrokerState {
    online: bool,
    next_id: u64,
    subscriptions: Vec<Subscription>,
    max_queue: usize,
    delivered: u64,
}

/// In-process publish/subscribe broker
///
/// Cloning yields another handle to the same broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Create an online broker
    pub fn new() -> Self {
        Self::with_queue_limit(1000)
    }

    /// Create a broker that keeps at most `max_queue` undelivered payloads
    /// per subscription, discarding the oldest beyond that
    pub fn with_queue_limit(max_queue: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                next_id: 0,
                subscriptions: Vec::new(),
                max_queue: max_queue.max(1),
                delivered: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the broker up or down
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Whether the broker accepts connections
    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Payloads delivered to subscriptions so far
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    /// A publishing link
    pub fn link(&self) -> BrokerLink {
        BrokerLink {
            broker: self.clone(),
            subscription: None,
            connected: false,
            metrics: TransportMetrics::default(),
        }
    }

    /// A link subscribed to `topic`
    ///
    /// The subscription exists from this call on, so payloads published
    /// while the link is disconnected are still queued for it.
    pub fn subscribe(&self, topic: &str) -> BrokerLink {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscriptions.push(Subscription {
                id,
                topic: topic.to_string(),
                queue: VecDeque::new(),
            });
            id
        };
        BrokerLink {
            broker: self.clone(),
            subscription: Some(id),
            connected: false,
            metrics: TransportMetrics::default(),
        }
    }

    fn deliver(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        let mut state = self.lock();
        if !state.online {
            return Err(TransportError::unavailable("broker offline"));
        }
        let max_queue = state.max_queue;
        let mut delivered = 0;
        for sub in state.subscriptions.iter_mut().filter(|s| s.topic == topic) {
            if sub.queue.len() >= max_queue {
                sub.queue.pop_front();
            }
            sub.queue.push_back(payload.to_vec());
            delivered += 1;
        }
        state.delivered += delivered;
        Ok(())
    }

    fn drain(&self, id: u64) -> TransportResult<Vec<Vec<u8>>> {
        let mut state = self.lock();
        if !state.online {
            return Err(TransportError::unavailable("broker offline"));
        }
        Ok(state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| s.queue.drain(..).collect())
            .unwrap_or_default())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Client handle onto a [`MemoryBroker`]
#[derive(Debug)]
pub struct BrokerLink {
    broker: MemoryBroker,
    subscription: Option<u64>,
    connected: bool,
    metrics: TransportMetrics,
}

impl BrokerLink {
    fn drop_link(&mut self, err: TransportError) -> TransportError {
        self.connected = false;
        err
    }
}

impl Transport for BrokerLink {
    fn connect(&mut self) -> TransportResult<()> {
        if !self.broker.is_online() {
            return Err(TransportError::unavailable("broker unreachable"));
        }
        self.connected = true;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Err(e) = self.broker.deliver(topic, payload) {
            self.metrics.publish_failures += 1;
            return Err(self.drop_link(e));
        }
        self.metrics.bytes_sent += payload.len() as u64;
        self.metrics.messages_sent += 1;
        Ok(())
    }

    fn poll(&mut self) -> TransportResult<Vec<Vec<u8>>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if !self.broker.is_online() {
            return Err(self.drop_link(TransportError::unavailable("keepalive lost")));
        }
        let Some(id) = self.subscription else {
            return Ok(Vec::new());
        };
        let received = self.broker.drain(id).map_err(|e| self.drop_link(e))?;
        for payload in &received {
            self.metrics.bytes_received += payload.len() as u64;
            self.metrics.messages_received += 1;
        }
        Ok(received)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.clone()
    }
}

/// Link that simulates publish loss
///
/// A lost publish is reported as `TransportUnavailable` but leaves the
/// inner link open, like a broker that silently refuses a message.
#[derive(Debug)]
pub struct LossyLink<T: Transport> {
    inner: T,
    loss_rate: f32,
    rng: StdRng,
    lost: u64,
}

impl<T: Transport> LossyLink<T> {
    /// Wrap a link with the given loss rate (0.0-1.0)
    pub fn new(inner: T, loss_rate: f32) -> Self {
        Self::with_seed(inner, loss_rate, 12345)
    }

    /// Wrap a link with an explicit PRNG seed
    pub fn with_seed(inner: T, loss_rate: f32, seed: u64) -> Self {
        Self {
            inner,
            loss_rate: loss_rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
            lost: 0,
        }
    }

    /// Publishes dropped so far
    pub fn lost(&self) -> u64 {
        self.lost
    }
}

impl<T: Transport> Transport for LossyLink<T> {
    fn connect(&mut self) -> TransportResult<()> {
        self.inner.connect()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        if !self.inner.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.rng.gen::<f32>() < self.loss_rate {
            self.lost += 1;
            return Err(TransportError::unavailable("publish lost"));
        }
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
        let mut metrics = self.inner.metrics();
        metrics.publish_failures += self.lost;
        metrics
    }
}

/// Link whose outcomes are scripted up front
///
/// Each call pops the next scripted outcome for its operation; once a
/// script runs out every call succeeds.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    connect_script: VecDeque<bool>,
    publish_script: VecDeque<bool>,
    poll_script: VecDeque<bool>,
    connected: bool,
    connect_attempts: u32,
    published: Vec<(String, Vec<u8>)>,
    inbox: VecDeque<Vec<u8>>,
    metrics: TransportMetrics,
}

impl ScriptedTransport {
    /// Create a link on which everything succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts
    pub fn fail_connects(mut self, n: usize) -> Self {
        self.connect_script.extend(std::iter::repeat(false).take(n));
        self
    }

    /// Fail the next `n` publishes; the link stays open
    pub fn fail_publishes(mut self, n: usize) -> Self {
        self.publish_script.extend(std::iter::repeat(false).take(n));
        self
    }

    /// Queue an explicit publish outcome
    pub fn then_publish(mut self, ok: bool) -> Self {
        self.publish_script.push_back(ok);
        self
    }

    /// Fail the next poll, dropping the link
    pub fn fail_next_poll(mut self) -> Self {
        self.poll_script.push_back(false);
        self
    }

    /// Queue a payload to be returned by the next poll
    pub fn push_incoming(&mut self, payload: Vec<u8>) {
        self.inbox.push_back(payload);
    }

    /// Number of connect calls made
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts
    }

    /// Payloads published successfully, with their topics
    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> TransportResult<()> {
        self.connect_attempts += 1;
        if self.connect_script.pop_front().unwrap_or(true) {
            self.connected = true;
            Ok(())
        } else {
            Err(TransportError::unavailable("scripted connect failure"))
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.publish_script.pop_front().unwrap_or(true) {
            self.metrics.bytes_sent += payload.len() as u64;
            self.metrics.messages_sent += 1;
            self.published.push((topic.to_string(), payload.to_vec()));
            Ok(())
        } else {
            self.metrics.publish_failures += 1;
            Err(TransportError::unavailable("scripted publish failure"))
        }
    }

    fn poll(&mut self) -> TransportResult<Vec<Vec<u8>>> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if !self.poll_script.pop_front().unwrap_or(true) {
            self.connected = false;
            return Err(TransportError::unavailable("scripted keepalive failure"));
        }
        let received: Vec<Vec<u8>> = self.inbox.drain(..).collect();
        self.metrics.messages_received += received.len() as u64;
        Ok(received)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.clone()
    }
}
