//! Cascading averaging windows.
//!
//! Each level is a fixed-capacity ring behind its own mutex.  A flush
//! computes the mean and clears the ring inside one critical section, then
//! appends the mean to the next level under that level's lock, so an
//! append and a flush on the same ring never interleave.  If a consumer
//! stalls and a ring fills up, the oldest entry is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use heapless::Deque;
use log::{debug, warn};

use super::Reading;

/// Raw 3 s samples; a stalled power cycle can leave a few minutes' worth.
pub const FAST_CAPACITY: usize = 128;
/// One entry per flush of the level below.
pub const AGGREGATE_CAPACITY: usize = 32;

// ── Window ────────────────────────────────────────────────────

pub struct Window<const N: usize> {
    label: &'static str,
    buf: Mutex<Deque<Reading, N>>,
}

impl<const N: usize> Window<N> {
    pub const fn new(label: &'static str) -> Self {
        Self {
            label,
            buf: Mutex::new(Deque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Deque<Reading, N>> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, reading: Reading) {
        let mut buf = self.lock();
        if buf.is_full() {
            buf.pop_front();
            warn!("window {}: full, dropped oldest entry", self.label);
        }
        let pushed = buf.push_back(reading);
        debug_assert!(pushed.is_ok(), "slot freed above");
    }

    /// Mean of the ring, clearing it, when it holds at least `min` entries.
    /// Otherwise the ring is left untouched.
    pub fn take_mean(&self, min: usize) -> Option<Reading> {
        let mut buf = self.lock();
        if buf.is_empty() || buf.len() < min {
            return None;
        }
        let samples: Vec<Reading> = buf.iter().copied().collect();
        buf.clear();
        drop(buf);
        debug!("window {}: flushed {} entries", self.label, samples.len());
        Reading::mean(&samples)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ── Aggregator ────────────────────────────────────────────────

/// Four-level fast → short → medium → long cascade.
pub struct WindowAggregator {
    fast: Window<FAST_CAPACITY>,
    short: Window<AGGREGATE_CAPACITY>,
    medium: Window<AGGREGATE_CAPACITY>,
    long: Window<AGGREGATE_CAPACITY>,
    min_fast_samples: usize,
}

impl WindowAggregator {
    pub fn new(min_fast_samples: usize) -> Self {
        Self {
            fast: Window::new("fast"),
            short: Window::new("short"),
            medium: Window::new("medium"),
            long: Window::new("long"),
            min_fast_samples,
        }
    }

    /// Producer side: one decoded sample.
    pub fn push_sample(&self, reading: Reading) {
        self.fast.push(reading);
    }

    /// fast → short.  Waits for `min_fast_samples` before flushing.
    pub fn flush_fast(&self) -> Option<Reading> {
        let agg = self.fast.take_mean(self.min_fast_samples)?;
        self.short.push(agg);
        Some(agg)
    }

    /// short → medium.
    pub fn flush_short(&self) -> Option<Reading> {
        let agg = self.short.take_mean(1)?;
        self.medium.push(agg);
        Some(agg)
    }

    /// medium → long.
    pub fn flush_medium(&self) -> Option<Reading> {
        let agg = self.medium.take_mean(1)?;
        self.long.push(agg);
        Some(agg)
    }

    /// long → caller.
    pub fn flush_long(&self) -> Option<Reading> {
        self.long.take_mean(1)
    }

    /// `(fast, short, medium, long)` occupancy, for diagnostics.
    pub fn depths(&self) -> (usize, usize, usize, usize) {
        (
            self.fast.len(),
            self.short.len(),
            self.medium.len(),
            self.long.len(),
        )
    }
}
