// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed views over a named segment or a process-local allocation.
//!
//! The counter and the change signal use the same code path whether they
//! live in a named segment (cross-process) or on the heap (local-only
//! fallback when named shared memory is unavailable).

use super::segment::{Disposition, ShmSegment};
use super::Result;
use std::marker::PhantomData;
use std::time::Duration;

/// Fixed-layout structure that may be placed in shared memory.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, built only from atomics and padding,
/// and valid when every byte is zero (a freshly created segment).
pub unsafe trait ShmLayout: Send + Sync + Sized {
    /// All-zero value, the state of a freshly created segment
    fn zeroed() -> Self;
}

enum Backing<T> {
    Segment(ShmSegment, PhantomData<T>),
    Local(Box<T>),
}

/// A `T` mapped from a named segment or owned by this process.
pub struct ShmBlock<T: ShmLayout> {
    backing: Backing<T>,
    disposition: Disposition,
}

impl<T: ShmLayout> ShmBlock<T> {
    /// Map `T` from the named segment, creating it if absent.
    pub fn create_or_open(name: &str, attach_timeout: Duration) -> Result<Self> {
        let (segment, disposition) =
            ShmSegment::create_or_open(name, std::mem::size_of::<T>(), attach_timeout)?;
        Ok(Self {
            backing: Backing::Segment(segment, PhantomData),
            disposition,
        })
    }

    /// Process-local block; behaves like a segment this process created.
    #[must_use]
    pub fn local() -> Self {
        Self {
            backing: Backing::Local(Box::new(T::zeroed())),
            disposition: Disposition::Created,
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> &T {
        match &self.backing {
            // SAFETY:
            // - The mapping is exactly size_of::<T>() bytes (create_or_open)
            // - mmap returns page-aligned memory, which satisfies T's alignment
            // - ShmLayout guarantees all-zero and concurrently mutated bytes are valid T
            // - The reference cannot outlive the segment because it borrows self
            Backing::Segment(seg, _) => unsafe { &*seg.as_ptr().cast::<T>() },
            Backing::Local(boxed) => &**boxed,
        }
    }

    #[inline]
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    #[inline]
    #[must_use]
    pub fn is_creator(&self) -> bool {
        self.disposition == Disposition::Created
    }

    /// True when the block lives in a named segment
    #[inline]
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self.backing, Backing::Segment(..))
    }

    /// Segment name, `None` for local blocks
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.backing {
            Backing::Segment(seg, _) => Some(seg.name()),
            Backing::Local(_) => None,
        }
    }
}
