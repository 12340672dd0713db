// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # winsync - cross-process window count synchronization
//!
//! Keeps one integer, "how many windows of this application are open",
//! consistent across every process of the application and pushes each
//! change to in-process subscribers without polling.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use winsync::{ChannelSink, SyncConfig, WindowSync};
//!
//! let sink = Arc::new(ChannelSink::new());
//! let updates = sink.endpoint(1);
//!
//! let sync = WindowSync::local(SyncConfig::new("doc_demo"), sink.clone())?;
//! sync.register_subscriber(1);
//! assert_eq!(updates.recv_timeout(Duration::from_secs(1))?, 0);
//!
//! sync.on_window_created();
//! assert_eq!(updates.recv_timeout(Duration::from_secs(1))?, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Use [`WindowSync::open`] instead of `local` to share the count with other
//! processes; it falls back to a local counter when named shared memory is
//! unavailable.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |  WindowSync        on_window_created / on_window_destroyed    |
//! +--------------------------------------------------------------+
//! |  SharedCounter  -> ChangeSignal -> NotificationListener       |
//! |  (named segment)   (futex event)   (one thread per process)   |
//! +--------------------------------------------------------------+
//! |  SubscriberRegistry -> Deliver (ChannelSink, C callback, ...) |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SharedCounter`] | Atomic counter in a named segment, creator-initialized |
//! | [`ChangeSignal`] | Named manual/auto-reset event |
//! | [`NotificationListener`] | Background thread invoking a [`ChangeHandler`] |
//! | [`SubscriberRegistry`] | Fan-out to opaque handles with fault isolation |
//! | [`WindowSync`] | All of the above wired together |
//!
//! ## Logging
//!
//! Everything logs through the `log` facade with a bracketed component tag
//! (`[COUNTER]`, `[SIGNAL]`, `[LISTENER]`, `[REGISTRY]`, `[SYNC]`, `[SHM]`).
//! The library never installs a logger.

/// Sync configuration (names, timeouts, capacity).
pub mod config;
/// Cross-process counter.
pub mod counter;
/// Error types.
pub mod error;
/// Background change listener.
pub mod listener;
/// Pipeline counters.
pub mod metrics;
/// Subscriber fan-out.
pub mod registry;
/// Named shared memory and futex plumbing.
pub mod shm;
/// Named change signal.
pub mod signal;
/// Channel-backed delivery endpoints.
pub mod sink;
/// Composed pipeline.
pub mod sync;

pub use config::SyncConfig;
pub use counter::{SharedCounter, COUNTER_MARKER, COUNT_NOT_INITIALIZED};
pub use error::{DeliveryError, NotInitialized, Resource, Result, SyncError};
pub use listener::{ChangeHandler, ListenerState, NotificationListener};
pub use metrics::{MetricsSnapshot, SyncMetrics};
pub use registry::{BroadcastReport, Deliver, SubscriberHandle, SubscriberRegistry};
pub use signal::{ChangeSignal, ResetMode, WaitOutcome};
pub use sink::ChannelSink;
pub use sync::{SyncMode, WindowSync};
