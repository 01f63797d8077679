// CFE-HYDRO Node - Latest-wins mailbox
// Copyright (c) 2025 CFE-HYDRO Contributors
//
// Licensed under the MIT license.
// See LICENSE file for details.

//! Single-slot handoff between the accumulator and the publisher.
//!
//! Capacity is one. Putting into a full slot replaces the older item and
//! counts a stale drop, so the producer never waits on the consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
    stale: AtomicU64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            stale: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `item`; returns true if it displaced an untaken one.
    pub fn put(&self, item: T) -> bool {
        let displaced = self.lock().replace(item).is_some();
        if displaced {
            self.stale.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        displaced
    }

    pub fn try_take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Wait until an item is available.
    ///
    /// Cancel-safe: an item is only removed when the future completes.
    pub async fn take(&self) -> T {
        loop {
            if let Some(item) = self.try_take() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Items replaced before anyone took them.
    pub fn stale_drops(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
