// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named shared memory plumbing for cross-process window counting.
//!
//! ```text
//! +------------------+                      +------------------+
//! |   Process A      |   /winsync_*_count   |   Process B      |
//! |  SharedCounter --+----------------------+-> SharedCounter  |
//! |                  |   /winsync_*_signal  |                  |
//! |  ChangeSignal  --+----------------------+-> Listener       |
//! +------------------+   futex (wake)       +------------------+
//! ```
//!
//! Segments are created with an atomic create-or-open: exactly one process
//! sees [`Disposition::Created`], every other process attaches to the same
//! physical pages. Waiting and waking uses shared (non-private) futexes so
//! wakes cross process boundaries.

mod block;
mod futex;
mod segment;

pub use block::{ShmBlock, ShmLayout};
pub use futex::{futex_wait, futex_wake, futex_wake_all, futex_wake_one, FutexWait};
pub use segment::{Disposition, ShmSegment};

use std::fmt;
use std::io;

/// Errors that can occur while creating or mapping named segments
#[derive(Debug)]
pub enum ShmError {
    /// Shared memory segment creation failed
    SegmentCreate(io::Error),

    /// Shared memory segment open failed
    SegmentOpen(io::Error),

    /// Memory mapping failed
    Mmap(io::Error),

    /// Invalid segment name
    InvalidName(String),

    /// A segment with this name exists but has an incompatible size
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The creating process never finished sizing the segment
    NotReady(String),

    /// Named shared memory is not available on this platform
    Unsupported,
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(e) => write!(f, "Shared memory segment creation failed: {e}"),
            Self::SegmentOpen(e) => write!(f, "Shared memory segment open failed: {e}"),
            Self::Mmap(e) => write!(f, "Memory mapping failed: {e}"),
            Self::InvalidName(name) => write!(f, "Invalid segment name: {name}"),
            Self::SizeMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Segment {name} has size {actual} bytes, expected {expected}"
            ),
            Self::NotReady(name) => write!(f, "Segment {name} was never initialized by its creator"),
            Self::Unsupported => write!(f, "Named shared memory is not supported on this platform"),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(e) | Self::SegmentOpen(e) | Self::Mmap(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for SHM operations
pub type Result<T> = std::result::Result<T, ShmError>;

/// Replace anything that is not `[A-Za-z0-9_]` so the id is safe inside a
/// POSIX shm name.
#[must_use]
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Identifier of the user session that scopes segment names.
///
/// Named segments are machine-wide on POSIX systems, so the real user id
/// is folded into every name to keep two users' windows apart.
#[must_use]
pub fn session_scope() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: getuid has no preconditions and cannot fail.
        unsafe { libc::getuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}

/// Build a segment name: `/winsync_{app}_u{scope}_{kind}`
#[must_use]
pub fn segment_name(app_id: &str, kind: &str) -> String {
    format!(
        "/winsync_{}_u{}_{}",
        sanitize_component(app_id),
        session_scope(),
        kind
    )
}
