// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window sync metrics
//!
//! Atomic counters for the counter -> signal -> listener -> registry pipeline.
//! All counters use `Relaxed` ordering and are eventually consistent across
//! threads. One instance is shared by `Arc` between the components of a
//! single `WindowSync`; there is no process-wide instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    increments: AtomicU64,
    decrements: AtomicU64,
    signals: AtomicU64,
    wakes: AtomicU64,
    wait_timeouts: AtomicU64,
    handler_calls: AtomicU64,
    handler_panics: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub increments: u64,
    pub decrements: u64,
    pub signals: u64,
    pub wakes: u64,
    pub wait_timeouts: u64,
    pub handler_calls: u64,
    pub handler_panics: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

impl SyncMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            increments: AtomicU64::new(0),
            decrements: AtomicU64::new(0),
            signals: AtomicU64::new(0),
            wakes: AtomicU64::new(0),
            wait_timeouts: AtomicU64::new(0),
            handler_calls: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_increments(&self) {
        self.increments.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_decrements(&self) {
        self.decrements.fetch_add(1, Ordering::Relaxed);
    }

    /// Change signals raised by this process
    #[inline]
    pub fn inc_signals(&self) {
        self.signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Listener wakes that reported a change
    #[inline]
    pub fn inc_wakes(&self) {
        self.wakes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_wait_timeouts(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_handler_calls(&self) {
        self.handler_calls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_handler_panics(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_deliveries(&self, n: u64) {
        self.deliveries.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_delivery_failures(&self, n: u64) {
        self.delivery_failures.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            increments: self.increments.load(Ordering::Relaxed),
            decrements: self.decrements.load(Ordering::Relaxed),
            signals: self.signals.load(Ordering::Relaxed),
            wakes: self.wakes.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
            handler_calls: self.handler_calls.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.increments,
            &self.decrements,
            &self.signals,
            &self.wakes,
            &self.wait_timeouts,
            &self.handler_calls,
            &self.handler_panics,
            &self.deliveries,
            &self.delivery_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_is_zero() {
        assert_eq!(SyncMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters_and_reset() {
        let metrics = SyncMetrics::new();
        metrics.inc_increments();
        metrics.inc_increments();
        metrics.inc_decrements();
        metrics.add_deliveries(3);
        metrics.add_delivery_failures(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.increments, 2);
        assert_eq!(snap.decrements, 1);
        assert_eq!(snap.deliveries, 3);
        assert_eq!(snap.delivery_failures, 1);
        assert_eq!(snap.signals, 0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(SyncMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.inc_wakes();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }
        assert_eq!(metrics.snapshot().wakes, 4000);
    }
}
