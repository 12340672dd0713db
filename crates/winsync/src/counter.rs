// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-process window counter.
//!
//! ```text
//! CounterBlock (16 bytes, named segment)
//! +---------+-----------+---------------+
//! | count   | marker    | reserved[2]   |
//! | i32     | u32       | u32 x 2       |
//! +---------+-----------+---------------+
//! ```
//!
//! The first process to create the segment is the creator. A new segment
//! is zero-filled by the kernel, so `count` starts at 0 without anyone
//! storing it and an early attacher can never have its increment
//! overwritten. The creator only writes `marker`.
//!
//! The hot path (`increment` / `decrement` / `get`) is lock-free: the
//! mapping is published through an `ArcSwapOption` and the mutex only
//! serializes `initialize` against `shutdown`.

use crate::config::SyncConfig;
use crate::error::{NotInitialized, Resource, Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::shm::{self, ShmBlock, ShmLayout, ShmSegment};
use crate::signal::ChangeSignal;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Returned by [`SharedCounter::increment`] / [`SharedCounter::decrement`]
/// when the counter is not initialized. Never a reachable count in practice.
pub const COUNT_NOT_INITIALIZED: i32 = i32::MIN;

/// Written by the creator; proves a mapping is the shared segment.
pub const COUNTER_MARKER: u32 = 0xDEAD_BEEF;

/// Shared counter layout.
#[repr(C)]
pub struct CounterBlock {
    count: AtomicI32,
    marker: AtomicU32,
    _reserved: [AtomicU32; 2],
}

// SAFETY: repr(C), atomics only, all-zero is "count 0, no marker yet".
unsafe impl ShmLayout for CounterBlock {
    fn zeroed() -> Self {
        Self {
            count: AtomicI32::new(0),
            marker: AtomicU32::new(0),
            _reserved: [AtomicU32::new(0), AtomicU32::new(0)],
        }
    }
}

struct CounterMapping {
    block: ShmBlock<CounterBlock>,
    signal: Option<Arc<ChangeSignal>>,
}

impl CounterMapping {
    fn open(config: &SyncConfig) -> Result<Self> {
        let name = config.counter_segment_name();
        let block = ShmBlock::<CounterBlock>::create_or_open(&name, config.attach_timeout)
            .map_err(|source| SyncError::Resource {
                resource: Resource::Counter,
                source,
            })?;

        let b = block.get();
        if block.is_creator() {
            b.marker.store(COUNTER_MARKER, Ordering::Release);
            log::info!("[COUNTER] created {}", name);
        } else {
            match await_marker(b, config.attach_timeout) {
                Ok(()) => log::debug!(
                    "[COUNTER] attached to {} (count={})",
                    name,
                    b.count.load(Ordering::Acquire)
                ),
                Err(marker) => {
                    log::warn!("[COUNTER] attached to {} with marker {:#010x}", name, marker);
                }
            }
        }

        let signal = match ChangeSignal::create_or_open(config) {
            Ok(signal) => Some(Arc::new(signal)),
            Err(e) => {
                log::warn!("[COUNTER] {}; changes will not be announced", e);
                None
            }
        };

        Ok(Self { block, signal })
    }

    fn local(config: &SyncConfig) -> Self {
        let block = ShmBlock::<CounterBlock>::local();
        block.get().marker.store(COUNTER_MARKER, Ordering::Release);
        log::info!("[COUNTER] using process-local counter for '{}'", config.app_id);
        Self {
            block,
            signal: Some(Arc::new(ChangeSignal::local(config.reset_mode))),
        }
    }

    #[inline]
    fn announce(&self, metrics: &SyncMetrics) {
        if let Some(signal) = &self.signal {
            signal.signal();
            metrics.inc_signals();
        }
    }
}

/// Wait for the creator to publish the marker. The creator sizes the
/// segment before storing it, so an early attacher can see it unset.
fn await_marker(block: &CounterBlock, timeout: Duration) -> std::result::Result<(), u32> {
    let deadline = Instant::now() + timeout;
    loop {
        let marker = block.marker.load(Ordering::Acquire);
        if marker == COUNTER_MARKER {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(marker);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backing {
    Named,
    Local,
}

/// Window counter shared by every process using the same `app_id`.
pub struct SharedCounter {
    config: SyncConfig,
    backing: Backing,
    mapping: ArcSwapOption<CounterMapping>,
    init_lock: Mutex<()>,
    metrics: Arc<SyncMetrics>,
}

impl SharedCounter {
    /// Counter over the named segment derived from `config`. No OS
    /// resources are touched until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self::with_backing(config, Backing::Named)
    }

    /// Counter that lives in this process only (degraded mode).
    #[must_use]
    pub fn local(config: SyncConfig) -> Self {
        Self::with_backing(config, Backing::Local)
    }

    fn with_backing(config: SyncConfig, backing: Backing) -> Self {
        Self {
            config,
            backing,
            mapping: ArcSwapOption::empty(),
            init_lock: Mutex::new(()),
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    /// Record into `metrics` instead of a private instance.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Create or attach to the segment and the change signal.
    ///
    /// Idempotent. Fails only when the counter segment itself cannot be
    /// set up; a missing change signal is logged and tolerated.
    pub fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock();
        if self.mapping.load().is_some() {
            return Ok(());
        }

        let mapping = match self.backing {
            Backing::Named => CounterMapping::open(&self.config)?,
            Backing::Local => CounterMapping::local(&self.config),
        };
        self.mapping.store(Some(Arc::new(mapping)));
        Ok(())
    }

    /// Add one and announce the change. Returns the new count.
    pub fn try_increment(&self) -> std::result::Result<i32, NotInitialized> {
        let guard = self.mapping.load();
        let Some(m) = &*guard else {
            return Err(NotInitialized);
        };
        let count = m.block.get().count.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        self.metrics.inc_increments();
        m.announce(&self.metrics);
        log::debug!("[COUNTER] increment -> {}", count);
        Ok(count)
    }

    /// Subtract one and announce the change. Returns the new count, which
    /// goes negative on unbalanced calls.
    pub fn try_decrement(&self) -> std::result::Result<i32, NotInitialized> {
        let guard = self.mapping.load();
        let Some(m) = &*guard else {
            return Err(NotInitialized);
        };
        let count = m.block.get().count.fetch_sub(1, Ordering::AcqRel).wrapping_sub(1);
        self.metrics.inc_decrements();
        m.announce(&self.metrics);
        log::debug!("[COUNTER] decrement -> {}", count);
        Ok(count)
    }

    /// [`try_increment`](Self::try_increment), or [`COUNT_NOT_INITIALIZED`].
    pub fn increment(&self) -> i32 {
        self.try_increment().unwrap_or_else(|NotInitialized| {
            log::warn!("[COUNTER] increment before initialize");
            COUNT_NOT_INITIALIZED
        })
    }

    /// [`try_decrement`](Self::try_decrement), or [`COUNT_NOT_INITIALIZED`].
    pub fn decrement(&self) -> i32 {
        self.try_decrement().unwrap_or_else(|NotInitialized| {
            log::warn!("[COUNTER] decrement before initialize");
            COUNT_NOT_INITIALIZED
        })
    }

    /// Snapshot of the count; 0 when not initialized.
    #[must_use]
    pub fn get(&self) -> i32 {
        match &*self.mapping.load() {
            Some(m) => m.block.get().count.load(Ordering::Acquire),
            None => 0,
        }
    }

    /// Marker word of the mapped block, `None` when not initialized
    #[must_use]
    pub fn marker(&self) -> Option<u32> {
        (*self.mapping.load())
            .as_ref()
            .map(|m| m.block.get().marker.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.mapping.load().is_some()
    }

    /// True when this instance created the segment (always true for local)
    #[must_use]
    pub fn is_creator(&self) -> bool {
        (*self.mapping.load())
            .as_ref()
            .is_some_and(|m| m.block.is_creator())
    }

    /// True when initialized over a named segment
    #[must_use]
    pub fn is_shared(&self) -> bool {
        (*self.mapping.load())
            .as_ref()
            .is_some_and(|m| m.block.is_shared())
    }

    /// Change signal announced on every update, if one could be set up
    #[must_use]
    pub fn signal(&self) -> Option<Arc<ChangeSignal>> {
        (*self.mapping.load()).as_ref().and_then(|m| m.signal.clone())
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Unmap this process's view. Idempotent; other processes keep theirs.
    pub fn shutdown(&self) {
        let _guard = self.init_lock.lock();
        if self.mapping.swap(None).is_some() {
            log::debug!("[COUNTER] released '{}'", self.config.app_id);
        }
    }

    /// Remove the named counter and signal.
    ///
    /// Named segments outlive every process that mapped them. Call this
    /// when the application knows no instance is left.
    pub fn unlink(config: &SyncConfig) -> shm::Result<()> {
        let counter = ShmSegment::unlink(&config.counter_segment_name());
        let signal = ChangeSignal::unlink(config);
        counter.and(signal)
    }
}

impl std::fmt::Debug for SharedCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounter")
            .field("app_id", &self.config.app_id)
            .field("backing", &self.backing)
            .field("initialized", &self.is_initialized())
            .field("count", &self.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn unique_config() -> SyncConfig {
        SyncConfig::new(format!(
            "countertest_{}_{}",
            std::process::id(),
            fastrand::u32(..)
        ))
    }

    #[test]
    fn test_block_size() {
        assert_eq!(std::mem::size_of::<CounterBlock>(), 16);
    }

    #[test]
    fn test_not_initialized_sentinel() {
        let counter = SharedCounter::local(unique_config());
        assert_eq!(counter.try_increment(), Err(NotInitialized));
        assert_eq!(counter.increment(), COUNT_NOT_INITIALIZED);
        assert_eq!(counter.decrement(), COUNT_NOT_INITIALIZED);
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.marker(), None);
        assert!(!counter.is_creator());
    }

    #[test]
    fn test_local_round_trip_and_negative() {
        let counter = SharedCounter::local(unique_config());
        counter.initialize().expect("init");
        counter.initialize().expect("second init is a no-op");

        assert!(!counter.is_shared());
        assert!(counter.is_creator());
        assert_eq!(counter.marker(), Some(COUNTER_MARKER));

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.decrement(), 0);
        assert_eq!(counter.decrement(), -1);
        assert_eq!(counter.get(), -1);
        assert_ne!(counter.get(), COUNT_NOT_INITIALIZED);
    }

    #[test]
    fn test_update_announces_change() {
        let counter = SharedCounter::local(unique_config());
        counter.initialize().expect("init");
        let signal = counter.signal().expect("local counter has a signal");

        let before = signal.generation();
        counter.increment();
        counter.decrement();
        assert_eq!(signal.generation(), before.wrapping_add(2));
        assert_eq!(counter.metrics().snapshot().signals, 2);
    }

    #[test]
    fn test_attacher_waits_for_late_marker() {
        let block = CounterBlock::zeroed();
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(20));
                block.marker.store(COUNTER_MARKER, Ordering::Release);
            });
            assert_eq!(await_marker(&block, Duration::from_secs(2)), Ok(()));
        });
    }

    #[test]
    fn test_missing_marker_times_out() {
        let block = CounterBlock::zeroed();
        block.marker.store(0x1234, Ordering::Release);
        assert_eq!(await_marker(&block, Duration::from_millis(10)), Err(0x1234));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let counter = SharedCounter::local(unique_config());
        counter.shutdown();
        counter.initialize().expect("init");
        counter.increment();
        counter.shutdown();
        counter.shutdown();
        assert!(!counter.is_initialized());
        assert_eq!(counter.get(), 0);
        assert_eq!(counter.increment(), COUNT_NOT_INITIALIZED);
    }

    #[test]
    fn test_concurrent_increments() {
        let counter = Arc::new(SharedCounter::local(unique_config()));
        counter.initialize().expect("init");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..500 {
                        c.increment();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread panicked");
        }
        assert_eq!(counter.get(), 2000);
    }

    #[test]
    #[cfg(unix)]
    fn test_named_creator_and_attacher() {
        let config = unique_config();
        let a = SharedCounter::new(config.clone());
        let b = SharedCounter::new(config.clone());
        a.initialize().expect("init a");
        assert_eq!(a.increment(), 1);

        b.initialize().expect("init b");
        assert!(a.is_creator());
        assert!(!b.is_creator());
        assert!(b.is_shared());
        assert_eq!(b.marker(), Some(COUNTER_MARKER));
        assert_eq!(b.get(), 1);

        assert_eq!(b.increment(), 2);
        assert_eq!(a.get(), 2);

        SharedCounter::unlink(&config).expect("unlink");
    }
}
