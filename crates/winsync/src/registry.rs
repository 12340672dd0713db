// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber registry: fan-out of the current count to opaque handles.
//!
//! Handles are routing tokens owned by the delivery mechanism ([`Deliver`]);
//! the registry never interprets them. One lock serializes `register`,
//! `unregister` and the whole of `broadcast`. Cardinality is expected to be
//! a few endpoints, so holding the lock across the fan-out is fine.
//!
//! A failed delivery is logged and reported in the [`BroadcastReport`]. It
//! never aborts the fan-out and never removes the handle.

use crate::error::{DeliveryError, Result, SyncError};
use crate::metrics::SyncMetrics;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Opaque subscriber endpoint identifier
pub type SubscriberHandle = i64;

/// Delivers a count to one subscriber endpoint.
///
/// Called with the registry lock held; must not call back into the
/// registry.
pub trait Deliver: Send + Sync {
    fn deliver(&self, handle: SubscriberHandle, count: i32) -> std::result::Result<(), DeliveryError>;
}

impl<F> Deliver for F
where
    F: Fn(SubscriberHandle, i32) -> std::result::Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, handle: SubscriberHandle, count: i32) -> std::result::Result<(), DeliveryError> {
        self(handle, count)
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Value that was broadcast
    pub value: i32,
    /// Handles registered at broadcast time
    pub attempted: usize,
    /// Successful deliveries
    pub delivered: usize,
    /// Handles whose delivery failed, with the reason
    pub failures: Vec<(SubscriberHandle, DeliveryError)>,
}

impl BroadcastReport {
    /// True when every registered handle received the value
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Thread-safe set of subscriber handles.
pub struct SubscriberRegistry {
    handles: Mutex<Vec<SubscriberHandle>>,
    sink: Arc<dyn Deliver>,
    capacity: usize,
    metrics: Arc<SyncMetrics>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new(sink: Arc<dyn Deliver>, capacity: usize) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            sink,
            capacity,
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Add `handle` and, if given, deliver `initial` to that handle only.
    ///
    /// Returns `true` when the handle was added, `false` when it was
    /// already registered (the set is unchanged, `initial` is still
    /// delivered). A failed initial delivery is logged, not returned.
    pub fn register(&self, handle: SubscriberHandle, initial: Option<i32>) -> Result<bool> {
        self.insert(handle, initial.map(|value| move || value))
    }

    /// Add `handle` and deliver `current()` to it.
    ///
    /// `current` runs after the insert with the registry lock held, so a
    /// broadcast racing the registration is delivered after the initial
    /// value and the handle never ends up holding the older one.
    pub fn register_with<F>(&self, handle: SubscriberHandle, current: F) -> Result<bool>
    where
        F: FnOnce() -> i32,
    {
        self.insert(handle, Some(current))
    }

    fn insert<F>(&self, handle: SubscriberHandle, initial: Option<F>) -> Result<bool>
    where
        F: FnOnce() -> i32,
    {
        let mut handles = self.handles.lock();
        let added = if handles.contains(&handle) {
            false
        } else {
            if handles.len() >= self.capacity {
                log::warn!("[REGISTRY] rejecting {}: registry full", handle);
                return Err(SyncError::RegistryFull {
                    capacity: self.capacity,
                });
            }
            handles.push(handle);
            true
        };

        log::debug!(
            "[REGISTRY] register {} ({}, {} total)",
            handle,
            if added { "new" } else { "existing" },
            handles.len()
        );

        if let Some(current) = initial {
            let value = current();
            match self.deliver_one(handle, value) {
                Ok(()) => self.metrics.add_deliveries(1),
                Err(e) => {
                    self.metrics.add_delivery_failures(1);
                    log::warn!("[REGISTRY] initial value to {} failed: {}", handle, e);
                }
            }
        }
        Ok(added)
    }

    /// Remove `handle`. Returns whether it was present.
    pub fn unregister(&self, handle: SubscriberHandle) -> bool {
        let mut handles = self.handles.lock();
        match handles.iter().position(|&h| h == handle) {
            Some(idx) => {
                handles.swap_remove(idx);
                log::debug!("[REGISTRY] unregister {} ({} left)", handle, handles.len());
                true
            }
            None => false,
        }
    }

    /// Deliver `value` to every registered handle.
    pub fn broadcast(&self, value: i32) -> BroadcastReport {
        let handles = self.handles.lock();
        let mut report = BroadcastReport {
            value,
            attempted: handles.len(),
            ..Default::default()
        };

        for &handle in handles.iter() {
            match self.deliver_one(handle, value) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    log::warn!("[REGISTRY] delivery of {} to {} failed: {}", value, handle, e);
                    report.failures.push((handle, e));
                }
            }
        }
        drop(handles);

        self.metrics.add_deliveries(report.delivered as u64);
        self.metrics.add_delivery_failures(report.failures.len() as u64);
        log::trace!(
            "[REGISTRY] broadcast {} -> {}/{}",
            value,
            report.delivered,
            report.attempted
        );
        report
    }

    fn deliver_one(&self, handle: SubscriberHandle, value: i32) -> std::result::Result<(), DeliveryError> {
        catch_unwind(AssertUnwindSafe(|| self.sink.deliver(handle, value)))
            .unwrap_or(Err(DeliveryError::Panicked))
    }

    #[must_use]
    pub fn contains(&self, handle: SubscriberHandle) -> bool {
        self.handles.lock().contains(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Registered handles, in no particular order
    #[must_use]
    pub fn handles(&self) -> Vec<SubscriberHandle> {
        self.handles.lock().clone()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every handle (subscriber teardown). Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut handles = self.handles.lock();
        let n = handles.len();
        handles.clear();
        n
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("handles", &*self.handles.lock())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct RecordingSink {
        received: Mutex<Vec<(SubscriberHandle, i32)>>,
        failing: Mutex<HashSet<SubscriberHandle>>,
        panicking: Mutex<HashSet<SubscriberHandle>>,
    }

    impl RecordingSink {
        fn received_by(&self, handle: SubscriberHandle) -> Vec<i32> {
            self.received
                .lock()
                .iter()
                .filter(|(h, _)| *h == handle)
                .map(|(_, v)| *v)
                .collect()
        }
    }

    impl Deliver for RecordingSink {
        fn deliver(&self, handle: SubscriberHandle, count: i32) -> std::result::Result<(), DeliveryError> {
            if self.panicking.lock().contains(&handle) {
                panic!("sink panic for {handle}");
            }
            if self.failing.lock().contains(&handle) {
                return Err(DeliveryError::Disconnected);
            }
            self.received.lock().push((handle, count));
            Ok(())
        }
    }

    fn registry() -> (Arc<RecordingSink>, SubscriberRegistry) {
        let sink = Arc::new(RecordingSink::default());
        let registry = SubscriberRegistry::new(sink.clone(), 8);
        (sink, registry)
    }

    #[test]
    fn test_register_unregister() {
        let (_sink, reg) = registry();
        assert!(reg.register(10, None).expect("register"));
        assert!(!reg.register(10, None).expect("re-register"));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains(10));

        assert!(reg.unregister(10));
        assert!(!reg.unregister(10));
        assert!(!reg.unregister(99));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_initial_value_goes_to_new_handle_only() {
        let (sink, reg) = registry();
        reg.register(1, None).expect("register");
        reg.register(2, None).expect("register");
        reg.register(3, Some(5)).expect("register");

        assert_eq!(sink.received_by(3), vec![5]);
        assert!(sink.received_by(1).is_empty());
        assert!(sink.received_by(2).is_empty());
    }

    #[test]
    fn test_register_with_orders_racing_broadcast_after_initial() {
        let sink = Arc::new(RecordingSink::default());
        let reg = Arc::new(SubscriberRegistry::new(sink.clone(), 8));

        let mut racer = None;
        let added = reg
            .register_with(4, || {
                let reg = Arc::clone(&reg);
                racer = Some(std::thread::spawn(move || reg.broadcast(2)));
                std::thread::sleep(std::time::Duration::from_millis(50));
                1
            })
            .expect("register");
        assert!(added);

        let report = racer
            .expect("racer spawned")
            .join()
            .expect("broadcast thread panicked");
        assert_eq!(report.attempted, 1);
        assert_eq!(sink.received_by(4), vec![1, 2]);
    }

    #[test]
    fn test_reregister_does_not_duplicate_broadcast() {
        let (sink, reg) = registry();
        reg.register(7, None).expect("register");
        reg.register(7, None).expect("re-register");

        let report = reg.broadcast(4);
        assert_eq!(report.attempted, 1);
        assert_eq!(sink.received_by(7), vec![4]);
    }

    #[test]
    fn test_broadcast_fault_isolation() {
        let (sink, reg) = registry();
        for h in [1, 2, 3] {
            reg.register(h, None).expect("register");
        }
        sink.failing.lock().insert(2);

        let report = reg.broadcast(9);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures, vec![(2, DeliveryError::Disconnected)]);
        assert!(!report.is_complete());

        assert_eq!(sink.received_by(1), vec![9]);
        assert_eq!(sink.received_by(3), vec![9]);
        assert!(reg.contains(2), "failed handle must stay registered");
    }

    #[test]
    fn test_panicking_sink_is_isolated() {
        let (sink, reg) = registry();
        reg.register(1, None).expect("register");
        reg.register(2, None).expect("register");
        sink.panicking.lock().insert(1);

        let report = reg.broadcast(3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures, vec![(1, DeliveryError::Panicked)]);
        assert_eq!(sink.received_by(2), vec![3]);

        // Lock is not poisoned.
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_capacity() {
        let sink: Arc<dyn Deliver> =
            Arc::new(|_: SubscriberHandle, _: i32| -> std::result::Result<(), DeliveryError> { Ok(()) });
        let reg = SubscriberRegistry::new(sink, 2);
        reg.register(1, None).expect("register");
        reg.register(2, None).expect("register");
        assert!(matches!(
            reg.register(3, None),
            Err(SyncError::RegistryFull { capacity: 2 })
        ));
        // Existing handles are still accepted at capacity.
        assert!(!reg.register(2, Some(1)).expect("re-register"));
        assert_eq!(reg.clear(), 2);
        assert!(reg.register(3, None).expect("register after clear"));
    }

    #[test]
    fn test_broadcast_empty() {
        let (_sink, reg) = registry();
        let report = reg.broadcast(1);
        assert_eq!(report.attempted, 0);
        assert!(report.is_complete());
    }
}
