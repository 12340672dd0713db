// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named change signal, an event object shared across processes.
//!
//! # Layout
//!
//! ```text
//! SignalBlock (16 bytes, own named segment)
//! +-----------+------------+-------+------------+
//! | wake_seq  | generation | state | mode word  |
//! +-----------+------------+-------+------------+
//!   futex word  +1 per signal  0/1   set by creator
//! ```
//!
//! `state` gives classic event semantics (`wait` / `reset` / `is_set`).
//! `generation` lets every listener in every process observe each burst of
//! signals exactly once without anybody resetting a manual-reset event.
//! `wake_seq` is the only futex word: it moves on every signal and on every
//! [`ChangeSignal::interrupt`], so "take ticket, re-check, wait" never loses
//! a wake.
//!
//! The signal carries no payload. A wake means "re-read the counter".

use crate::config::SyncConfig;
use crate::error::{Resource, Result, SyncError};
use crate::shm::{futex_wait, futex_wake_all, futex_wake_one, FutexWait, ShmBlock, ShmLayout, ShmSegment};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const MODE_MANUAL: u32 = 0x5347_0001;
const MODE_AUTO: u32 = 0x5347_0002;

/// Reset policy of a [`ChangeSignal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "lowercase"))]
pub enum ResetMode {
    /// Wakes all waiters and stays set until `reset()`
    #[default]
    Manual,
    /// Wakes one waiter and clears itself
    Auto,
}

impl ResetMode {
    fn encode(self) -> u32 {
        match self {
            Self::Manual => MODE_MANUAL,
            Self::Auto => MODE_AUTO,
        }
    }

    fn decode(raw: u32) -> Option<Self> {
        match raw {
            MODE_MANUAL => Some(Self::Manual),
            MODE_AUTO => Some(Self::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for ResetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ResetMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown reset mode '{other}' (expected manual or auto)")),
        }
    }
}

/// Shared state of a change signal.
#[repr(C)]
pub struct SignalBlock {
    wake_seq: AtomicU32,
    generation: AtomicU32,
    state: AtomicU32,
    mode: AtomicU32,
}

// SAFETY: repr(C), four AtomicU32, all-zero is "not signaled, mode unset".
unsafe impl ShmLayout for SignalBlock {
    fn zeroed() -> Self {
        Self {
            wake_seq: AtomicU32::new(0),
            generation: AtomicU32::new(0),
            state: AtomicU32::new(0),
            mode: AtomicU32::new(0),
        }
    }
}

/// Snapshot of the futex word, taken before re-checking any exit condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTicket(u32);

/// Last generation a waiter has observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeCursor(u32);

/// Result of one [`ChangeSignal::wait_for_change`] pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A change was published since the cursor
    Signaled,
    /// Nothing happened within the timeout
    TimedOut,
    /// Woken without a change (interrupt, spurious wake, EINTR)
    Interrupted,
}

/// Named wait/signal object correlated with a counter by naming convention.
pub struct ChangeSignal {
    block: ShmBlock<SignalBlock>,
    mode: ResetMode,
}

impl ChangeSignal {
    /// Create the named signal or attach to the existing one.
    ///
    /// The creator's reset mode wins; an attacher configured differently
    /// adopts it with a warning.
    pub fn create_or_open(config: &SyncConfig) -> Result<Self> {
        let name = config.signal_segment_name();
        let block = ShmBlock::<SignalBlock>::create_or_open(&name, config.attach_timeout).map_err(
            |source| SyncError::Resource {
                resource: Resource::Signal,
                source,
            },
        )?;

        let mode = if block.is_creator() {
            block.get().mode.store(config.reset_mode.encode(), Ordering::Release);
            log::info!("[SIGNAL] created {} ({} reset)", name, config.reset_mode);
            config.reset_mode
        } else {
            let mode = Self::adopt_mode(&block, config);
            log::debug!("[SIGNAL] attached to {} ({} reset)", name, mode);
            mode
        };

        Ok(Self { block, mode })
    }

    /// Process-local signal; wakes only threads of this process.
    #[must_use]
    pub fn local(mode: ResetMode) -> Self {
        let block = ShmBlock::<SignalBlock>::local();
        block.get().mode.store(mode.encode(), Ordering::Release);
        Self { block, mode }
    }

    fn adopt_mode(block: &ShmBlock<SignalBlock>, config: &SyncConfig) -> ResetMode {
        let deadline = Instant::now() + config.attach_timeout;
        loop {
            if let Some(mode) = ResetMode::decode(block.get().mode.load(Ordering::Acquire)) {
                if mode != config.reset_mode {
                    log::warn!(
                        "[SIGNAL] configured {} reset but creator chose {}, using {}",
                        config.reset_mode,
                        mode,
                        mode
                    );
                }
                return mode;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "[SIGNAL] creator never recorded a reset mode, assuming {}",
                    config.reset_mode
                );
                return config.reset_mode;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Effective reset mode
    #[must_use]
    pub fn mode(&self) -> ResetMode {
        self.mode
    }

    #[must_use]
    pub fn is_creator(&self) -> bool {
        self.block.is_creator()
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.block.is_shared()
    }

    /// Publish a change and wake waiters (all for manual, one for auto).
    pub fn signal(&self) {
        let b = self.block.get();
        b.state.store(1, Ordering::Release);
        b.generation.fetch_add(1, Ordering::AcqRel);
        b.wake_seq.fetch_add(1, Ordering::Release);

        let woken = match self.mode {
            ResetMode::Manual => futex_wake_all(&b.wake_seq),
            ResetMode::Auto => futex_wake_one(&b.wake_seq),
        };
        match woken {
            Ok(n) => log::trace!("[SIGNAL] signaled, {} waiter(s) woken", n),
            Err(e) => log::debug!("[SIGNAL] futex wake failed: {}", e),
        }
    }

    /// Clear the signaled state.
    pub fn reset(&self) {
        self.block.get().state.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.block.get().state.load(Ordering::Acquire) != 0
    }

    /// Number of signals ever published on this object (wrapping)
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.block.get().generation.load(Ordering::Acquire)
    }

    /// Classic event wait.
    ///
    /// Manual reset returns immediately while set. Auto reset consumes the
    /// signaled state so exactly one waiter returns per signal. Returns
    /// `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let ticket = self.ticket();
            if self.try_acquire() {
                return Ok(true);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            if futex_wait(&self.block.get().wake_seq, ticket.0, Some(remaining))?
                == FutexWait::TimedOut
            {
                return Ok(self.try_acquire());
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let state = &self.block.get().state;
        match self.mode {
            ResetMode::Manual => state.load(Ordering::Acquire) != 0,
            ResetMode::Auto => state
                .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    /// Snapshot the futex word. Take it before checking any stop condition.
    #[must_use]
    pub fn ticket(&self) -> WaitTicket {
        WaitTicket(self.block.get().wake_seq.load(Ordering::Acquire))
    }

    /// Cursor positioned at the current generation; past signals are ignored.
    #[must_use]
    pub fn cursor(&self) -> ChangeCursor {
        ChangeCursor(self.generation())
    }

    /// Single wait pass for a listener loop.
    ///
    /// Manual reset: `Signaled` when the generation moved past `cursor`,
    /// coalescing any number of signals into one wake. Auto reset: consumes
    /// the signaled state.
    pub fn wait_for_change(
        &self,
        ticket: WaitTicket,
        cursor: &mut ChangeCursor,
        timeout: Duration,
    ) -> io::Result<WaitOutcome> {
        if self.take_change(cursor) {
            return Ok(WaitOutcome::Signaled);
        }

        let outcome = futex_wait(&self.block.get().wake_seq, ticket.0, Some(timeout))?;
        if self.take_change(cursor) {
            return Ok(WaitOutcome::Signaled);
        }
        Ok(match outcome {
            FutexWait::TimedOut => WaitOutcome::TimedOut,
            FutexWait::Woken | FutexWait::ValueChanged | FutexWait::Interrupted => {
                WaitOutcome::Interrupted
            }
        })
    }

    fn take_change(&self, cursor: &mut ChangeCursor) -> bool {
        let generation = self.generation();
        match self.mode {
            ResetMode::Manual => {
                if generation == cursor.0 {
                    return false;
                }
                cursor.0 = generation;
                true
            }
            ResetMode::Auto => {
                cursor.0 = generation;
                self.try_acquire()
            }
        }
    }

    /// Wake every waiter without publishing a change.
    pub fn interrupt(&self) {
        let seq = &self.block.get().wake_seq;
        seq.fetch_add(1, Ordering::Release);
        if let Err(e) = futex_wake_all(seq) {
            log::debug!("[SIGNAL] futex wake failed: {}", e);
        }
    }

    /// Remove the named signal so the next `create_or_open` starts fresh.
    pub fn unlink(config: &SyncConfig) -> crate::shm::Result<()> {
        ShmSegment::unlink(&config.signal_segment_name())
    }
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("name", &self.block.name())
            .field("mode", &self.mode)
            .field("generation", &self.generation())
            .field("set", &self.is_set())
            .finish()
    }
}
