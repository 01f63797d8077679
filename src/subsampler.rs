//! Uniform random subsampling of a closed window
//!
//! For every signal the subsampler picks `k` of the window's `n` readings
//! uniformly at random without replacement. Chosen readings keep their
//! original `sample_time`; nothing is resampled or interpolated on the
//! sender. A signal with no usable readings produces no entry at all.

use crate::config::SparsityPolicy;
use crate::protocol::Reading;
use crate::window::Window;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Sparse readings selected for one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SparseSignal {
    /// Signal identifier
    pub signal_id: String,
    /// Selected readings in sample-time order
    pub readings: Vec<Reading>,
    /// Readings available before selection
    pub available: usize,
}

/// Per-window random selector
#[derive(Debug)]
pub struct Subsampler<R: Rng = StdRng> {
    policy: SparsityPolicy,
    rng: R,
}

impl Subsampler<StdRng> {
    /// Create a subsampler seeded from OS entropy
    pub fn new(policy: SparsityPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a reproducible subsampler
    pub fn seeded(policy: SparsityPolicy, seed: u64) -> Self {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Subsampler<R> {
    /// Create a subsampler over a caller-supplied generator
    pub fn with_rng(policy: SparsityPolicy, rng: R) -> Self {
        Self { policy, rng }
    }

    /// Active sparsity policy
    pub fn policy(&self) -> SparsityPolicy {
        self.policy
    }

    /// Select `k` of `readings`
    ///
    /// Returns every reading if there are no more than `k`. The result is
    /// ordered by `sample_time` and never contains the same reading twice.
    pub fn select(&mut self, readings: &[Reading], k: usize) -> Vec<Reading> {
        let n = readings.len();
        let mut chosen: Vec<Reading> = if k >= n {
            readings.to_vec()
        } else {
            let mut picks = index::sample(&mut self.rng, n, k).into_vec();
            picks.sort_unstable();
            picks.into_iter().map(|i| readings[i].clone()).collect()
        };
        chosen.sort_by_key(|r| r.sample_time);
        chosen
    }

    /// Subsample every usable signal of a closed window
    ///
    /// Faulted and empty signals are omitted.
    pub fn subsample(&mut self, window: &Window) -> Vec<SparseSignal> {
        let mut out = Vec::with_capacity(window.buckets().len());
        for bucket in window.buckets() {
            let usable = bucket.usable();
            let k = self.policy.target_count(usable.len());
            if k == 0 {
                continue;
            }
            out.push(SparseSignal {
                signal_id: bucket.signal_id.clone(),
                readings: self.select(usable, k),
                available: usable.len(),
            });
        }
        out
    }
}
