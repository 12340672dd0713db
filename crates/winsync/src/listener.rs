// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background listener for counter changes.
//!
//! One thread per listener blocks on the [`ChangeSignal`] and invokes the
//! registered [`ChangeHandler`] when a change is published. The handler gets
//! no payload and must re-read the counter.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Running --stop()--> Stopping --join--> Stopped
//! ```
//!
//! `stop()` interrupts the wait and joins the thread before returning. The
//! loop takes a wait ticket before it re-checks the running flag, so an
//! interrupt that lands between the check and the wait is never lost.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::metrics::SyncMetrics;
use crate::signal::{ChangeCursor, ChangeSignal, WaitOutcome};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

const LISTENER_THREAD_NAME: &str = "winsync-listener";

/// Callback invoked on the listener thread after each change.
///
/// Runs on the listener thread and must not block; marshal to another
/// execution context if needed. A panic is caught and logged.
pub trait ChangeHandler: Send + Sync + 'static {
    fn on_change(&self);
}

impl<F> ChangeHandler for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn on_change(&self) {
        self();
    }
}

struct HandlerSlot(Box<dyn ChangeHandler>);

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Stopped = 0,
    Running = 1,
    Stopping = 2,
}

impl ListenerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// State shared with the listener thread
struct Shared {
    state: AtomicU8,
    handler: ArcSwapOption<HandlerSlot>,
    metrics: Arc<SyncMetrics>,
    worker_id: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_worker(&self) -> bool {
        *self.worker_id.lock() == Some(thread::current().id())
    }

    fn dispatch(&self) {
        let guard = self.handler.load();
        let Some(slot) = &*guard else {
            return;
        };
        self.metrics.inc_handler_calls();
        if catch_unwind(AssertUnwindSafe(|| slot.0.on_change())).is_err() {
            self.metrics.inc_handler_panics();
            log::warn!("[LISTENER] change handler panicked; listener keeps running");
        }
    }
}

enum SignalSource {
    Named(SyncConfig),
    Attached(Arc<ChangeSignal>),
}

/// Waits for counter changes on a background thread.
///
/// `start()` and `stop()` serialize on the worker mutex, which `stop()`
/// holds across the join. Nothing the handler may call takes it.
pub struct NotificationListener {
    source: SignalSource,
    wait_timeout: Duration,
    shared: Arc<Shared>,
    opened: ArcSwapOption<ChangeSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationListener {
    /// Listener on the named signal derived from `config`, opened on `start()`.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_source(SignalSource::Named(config.clone()), config.wait_timeout)
    }

    /// Listener on an already opened signal (e.g. the counter's own).
    #[must_use]
    pub fn with_signal(signal: Arc<ChangeSignal>, wait_timeout: Duration) -> Self {
        Self::with_source(SignalSource::Attached(signal), wait_timeout)
    }

    fn with_source(source: SignalSource, wait_timeout: Duration) -> Self {
        Self {
            source,
            wait_timeout,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ListenerState::Stopped as u8),
                handler: ArcSwapOption::empty(),
                metrics: Arc::new(SyncMetrics::new()),
                worker_id: Mutex::new(None),
            }),
            opened: ArcSwapOption::empty(),
            worker: Mutex::new(None),
        }
    }

    /// Record into `metrics` instead of a private instance. Call before `start()`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        let handler = self.shared.handler.swap(None);
        self.shared = Arc::new(Shared {
            state: AtomicU8::new(ListenerState::Stopped as u8),
            handler: ArcSwapOption::new(handler),
            metrics,
            worker_id: Mutex::new(None),
        });
        self
    }

    /// Replace the handler. Allowed before and after `start()`.
    pub fn set_handler<H: ChangeHandler>(&self, handler: H) {
        self.shared
            .handler
            .store(Some(Arc::new(HandlerSlot(Box::new(handler)))));
    }

    /// Remove the handler; the wait loop keeps running.
    pub fn clear_handler(&self) {
        self.shared.handler.store(None);
    }

    /// Open the signal if needed and spawn the listener thread.
    ///
    /// Idempotent: starting a running listener succeeds without a second
    /// thread.
    pub fn start(&self) -> Result<()> {
        if self.shared.is_worker() {
            if self.shared.state() != ListenerState::Running {
                log::warn!("[LISTENER] start() from the listener thread while stopping is ignored");
            }
            return Ok(());
        }

        let mut worker = self.worker.lock();
        if self.shared.state() == ListenerState::Running {
            return Ok(());
        }

        // A loop that ended on its own (or was stopped from its handler)
        // has not been joined yet.
        if let Some(stale) = worker.take() {
            if stale.join().is_err() {
                log::error!("[LISTENER] previous listener thread panicked");
            }
        }

        let signal = match self.opened.load_full() {
            Some(signal) => signal,
            None => {
                let signal = match &self.source {
                    SignalSource::Named(config) => Arc::new(ChangeSignal::create_or_open(config)?),
                    SignalSource::Attached(signal) => Arc::clone(signal),
                };
                self.opened.store(Some(Arc::clone(&signal)));
                signal
            }
        };

        // Positioned before spawn so a change published right after
        // start() returns is observed.
        let cursor = signal.cursor();
        self.shared.set_state(ListenerState::Running);

        let shared = Arc::clone(&self.shared);
        let timeout = self.wait_timeout;
        let handle = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.into())
            .spawn(move || run_loop(&shared, &signal, cursor, timeout))
            .map_err(|e| {
                self.shared.set_state(ListenerState::Stopped);
                SyncError::ThreadSpawn(e)
            })?;

        *worker = Some(handle);
        log::info!("[LISTENER] started (wait timeout {:?})", self.wait_timeout);
        Ok(())
    }

    /// Interrupt the wait and join the listener thread.
    ///
    /// No-op when stopped. From inside the handler the stop is only
    /// requested; the thread exits after the handler returns and is joined
    /// by the next `start()`, `stop()` or drop. Dropping the last owner from
    /// inside the handler leaves nothing to join, so the thread finishes
    /// detached.
    pub fn stop(&self) {
        if self.shared.is_worker() {
            self.shared.set_state(ListenerState::Stopping);
            log::debug!("[LISTENER] stop requested from the listener thread");
            return;
        }

        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            self.shared.set_state(ListenerState::Stopped);
            return;
        };

        self.shared.set_state(ListenerState::Stopping);
        if let Some(signal) = &*self.opened.load() {
            signal.interrupt();
        }
        if handle.join().is_err() {
            log::error!("[LISTENER] listener thread panicked");
        }
        self.shared.set_state(ListenerState::Stopped);
        log::info!("[LISTENER] stopped");
    }

    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ListenerState::Running
    }

    /// Signal being waited on, once `start()` has opened it
    #[must_use]
    pub fn signal(&self) -> Option<Arc<ChangeSignal>> {
        match &self.source {
            SignalSource::Attached(signal) => Some(Arc::clone(signal)),
            SignalSource::Named(_) => self.opened.load_full(),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.shared.metrics
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        if self.shared.is_worker() {
            log::warn!("[LISTENER] dropped from its own handler; thread exits detached");
        }
        self.stop();
    }
}

fn run_loop(shared: &Shared, signal: &ChangeSignal, mut cursor: ChangeCursor, timeout: Duration) {
    *shared.worker_id.lock() = Some(thread::current().id());

    loop {
        let ticket = signal.ticket();
        if shared.state() != ListenerState::Running {
            break;
        }

        match signal.wait_for_change(ticket, &mut cursor, timeout) {
            Ok(WaitOutcome::Signaled) => {
                shared.metrics.inc_wakes();
                log::trace!("[LISTENER] change observed");
                shared.dispatch();
            }
            Ok(WaitOutcome::TimedOut) => {
                shared.metrics.inc_wait_timeouts();
            }
            Ok(WaitOutcome::Interrupted) => {}
            Err(e) => {
                log::error!("[LISTENER] wait failed, listener stopped: {}", e);
                shared.set_state(ListenerState::Stopped);
                break;
            }
        }
    }

    *shared.worker_id.lock() = None;
    log::debug!("[LISTENER] loop exited");
}
