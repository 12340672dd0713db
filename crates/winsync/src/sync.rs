// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Composed window count pipeline.
//!
//! ```text
//! on_window_created()            listener thread (every process)
//!   -> SharedCounter::increment     -> SharedCounter::get
//!   -> ChangeSignal::signal  ---->  -> SubscriberRegistry::broadcast
//!                                   -> Deliver (per handle)
//! ```
//!
//! [`WindowSync`] is an explicitly owned instance; there is no process-wide
//! singleton. Embedders hold it for as long as windows are tracked.

use crate::config::SyncConfig;
use crate::counter::SharedCounter;
use crate::error::Result;
use crate::listener::NotificationListener;
use crate::metrics::SyncMetrics;
use crate::registry::{BroadcastReport, Deliver, SubscriberHandle, SubscriberRegistry};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Whether the count is shared with other processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Named segment and signal, visible to every process of the app
    CrossProcess,
    /// Process-local counter; other processes are not seen
    Local,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrossProcess => write!(f, "cross-process"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Counter, listener and registry wired together.
pub struct WindowSync {
    config: SyncConfig,
    mode: SyncMode,
    counter: Arc<SharedCounter>,
    registry: Arc<SubscriberRegistry>,
    listener: NotificationListener,
    last_broadcast: Arc<AtomicI32>,
    metrics: Arc<SyncMetrics>,
}

impl WindowSync {
    /// Cross-process sync, falling back to a local counter when the named
    /// resources are unavailable. Check [`mode`](Self::mode) to tell.
    pub fn open(config: SyncConfig, sink: Arc<dyn Deliver>) -> Result<Self> {
        config.validate()?;
        match Self::build(config.clone(), Arc::clone(&sink), SyncMode::CrossProcess) {
            Ok(sync) => Ok(sync),
            Err(e) if e.is_resource() => {
                log::warn!("[SYNC] {}; counting windows in this process only", e);
                Self::build(config, sink, SyncMode::Local)
            }
            Err(e) => Err(e),
        }
    }

    /// Cross-process sync or an error; never degrades.
    pub fn open_strict(config: SyncConfig, sink: Arc<dyn Deliver>) -> Result<Self> {
        config.validate()?;
        Self::build(config, sink, SyncMode::CrossProcess)
    }

    /// Process-local sync.
    pub fn local(config: SyncConfig, sink: Arc<dyn Deliver>) -> Result<Self> {
        config.validate()?;
        Self::build(config, sink, SyncMode::Local)
    }

    fn build(config: SyncConfig, sink: Arc<dyn Deliver>, mode: SyncMode) -> Result<Self> {
        let metrics = Arc::new(SyncMetrics::new());

        let counter = match mode {
            SyncMode::CrossProcess => SharedCounter::new(config.clone()),
            SyncMode::Local => SharedCounter::local(config.clone()),
        }
        .with_metrics(Arc::clone(&metrics));
        counter.initialize()?;
        let counter = Arc::new(counter);

        let registry = Arc::new(
            SubscriberRegistry::new(sink, config.max_subscribers).with_metrics(Arc::clone(&metrics)),
        );

        let listener = match counter.signal() {
            Some(signal) => NotificationListener::with_signal(signal, config.wait_timeout),
            None => NotificationListener::new(&config),
        }
        .with_metrics(Arc::clone(&metrics));

        let last_broadcast = Arc::new(AtomicI32::new(counter.get()));
        {
            let counter = Arc::clone(&counter);
            let registry = Arc::clone(&registry);
            let last = Arc::clone(&last_broadcast);
            listener.set_handler(move || {
                let value = counter.get();
                last.store(value, Ordering::Release);
                registry.broadcast(value);
            });
        }
        listener.start()?;

        log::info!(
            "[SYNC] '{}' ready ({}, count={})",
            config.app_id,
            mode,
            counter.get()
        );

        Ok(Self {
            config,
            mode,
            counter,
            registry,
            listener,
            last_broadcast,
            metrics,
        })
    }

    /// A window opened. Returns the new count.
    pub fn on_window_created(&self) -> i32 {
        self.counter.increment()
    }

    /// A window closed. Returns the new count.
    pub fn on_window_destroyed(&self) -> i32 {
        self.counter.decrement()
    }

    /// Current count
    #[must_use]
    pub fn window_count(&self) -> i32 {
        self.counter.get()
    }

    /// Join the broadcast set and receive the current count right away.
    ///
    /// The count is read under the registry lock, so a change broadcast
    /// while the handle joins always arrives after the initial value.
    pub fn register_subscriber(&self, handle: SubscriberHandle) -> bool {
        match self.registry.register_with(handle, || self.counter.get()) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("[SYNC] cannot register subscriber {}: {}", handle, e);
                false
            }
        }
    }

    /// Leave the broadcast set. Returns whether the handle was registered.
    pub fn unregister_subscriber(&self, handle: SubscriberHandle) -> bool {
        self.registry.unregister(handle)
    }

    /// Broadcast the current count without waiting for a change.
    pub fn broadcast_now(&self) -> BroadcastReport {
        let value = self.counter.get();
        self.last_broadcast.store(value, Ordering::Release);
        self.registry.broadcast(value)
    }

    /// Value of the most recent broadcast (the count at open before any)
    #[must_use]
    pub fn last_broadcast(&self) -> i32 {
        self.last_broadcast.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    #[must_use]
    pub fn is_cross_process(&self) -> bool {
        self.mode == SyncMode::CrossProcess
    }

    #[must_use]
    pub fn counter(&self) -> &SharedCounter {
        &self.counter
    }

    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    #[must_use]
    pub fn listener(&self) -> &NotificationListener {
        &self.listener
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stop the listener, drop all subscribers and unmap. Idempotent.
    pub fn shutdown(&self) {
        self.listener.stop();
        let dropped = self.registry.clear();
        self.counter.shutdown();
        log::debug!(
            "[SYNC] '{}' shut down ({} subscriber(s) dropped)",
            self.config.app_id,
            dropped
        );
    }
}

impl Drop for WindowSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WindowSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSync")
            .field("app_id", &self.config.app_id)
            .field("mode", &self.mode)
            .field("count", &self.window_count())
            .field("subscribers", &self.registry.len())
            .field("listener", &self.listener.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use crate::COUNT_NOT_INITIALIZED;
    use std::time::Duration;

    fn local_sync() -> (Arc<ChannelSink>, WindowSync) {
        let sink = Arc::new(ChannelSink::new());
        let config = SyncConfig::new("synctest").with_wait_timeout(Duration::from_millis(50));
        let sync = WindowSync::local(config, sink.clone()).expect("local sync");
        (sink, sync)
    }

    #[test]
    fn test_local_mode() {
        let (_sink, sync) = local_sync();
        assert_eq!(sync.mode(), SyncMode::Local);
        assert!(!sync.is_cross_process());
        assert!(sync.listener().is_running());
    }

    #[test]
    fn test_register_delivers_current_count() {
        let (sink, sync) = local_sync();
        sync.on_window_created();
        sync.on_window_created();

        let rx = sink.endpoint(42);
        assert!(sync.register_subscriber(42));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(2));
    }

    #[test]
    fn test_change_reaches_subscriber() {
        let (sink, sync) = local_sync();
        let rx = sink.endpoint(1);
        sync.register_subscriber(1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(0));

        assert_eq!(sync.on_window_created(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Ok(1));
        assert_eq!(sync.last_broadcast(), 1);

        assert!(sync.unregister_subscriber(1));
        assert!(!sync.unregister_subscriber(1));
    }

    #[test]
    fn test_registry_full_returns_false() {
        let sink = Arc::new(ChannelSink::new());
        let config = SyncConfig::new("synctest_full").with_max_subscribers(1);
        let sync = WindowSync::local(config, sink).expect("local sync");
        assert!(sync.register_subscriber(1));
        assert!(!sync.register_subscriber(2));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let sink = Arc::new(ChannelSink::new());
        assert!(WindowSync::open(SyncConfig::new(""), sink).is_err());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (_sink, sync) = local_sync();
        sync.on_window_created();
        sync.shutdown();
        sync.shutdown();
        assert!(!sync.listener().is_running());
        assert!(sync.registry().is_empty());
        assert_eq!(sync.on_window_created(), COUNT_NOT_INITIALIZED);
    }
}
