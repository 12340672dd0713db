// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linux futex wrapper for inter-process wait/wake.
//!
//! # SHARED vs PRIVATE
//!
//! Only `FUTEX_WAIT` and `FUTEX_WAKE` are used, never the `_PRIVATE`
//! variants. The private variants key waiters by (mm, address) and would
//! silently fail to wake threads blocked on the same page in another
//! process.

use std::io;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Futex operation codes (SHARED, not PRIVATE)
#[cfg(target_os = "linux")]
const FUTEX_WAIT: i32 = 0; // NOT 128 (FUTEX_WAIT_PRIVATE)
#[cfg(target_os = "linux")]
const FUTEX_WAKE: i32 = 1; // NOT 129 (FUTEX_WAKE_PRIVATE)

/// How a futex wait returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexWait {
    /// Woken by `futex_wake` (or spuriously)
    Woken,
    /// The word no longer held the expected value when the wait started
    ValueChanged,
    /// The timeout elapsed
    TimedOut,
    /// A signal handler interrupted the wait
    Interrupted,
}

/// Wait on a futex word until woken, the value changes, or timeout expires.
///
/// Only blocks if `*addr == expected` at the time of the call, which is
/// what makes "snapshot, re-check, wait" free of lost wakeups.
///
/// # Errors
///
/// Any errno other than `EAGAIN`, `ETIMEDOUT` and `EINTR` is returned as an
/// error; it means the wait itself is broken, not that nothing happened.
#[cfg(target_os = "linux")]
pub fn futex_wait(addr: &AtomicU32, expected: u32, timeout: Option<Duration>) -> io::Result<FutexWait> {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });

    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: addr is a live reference for the duration of the call and the
    // remaining arguments are valid for FUTEX_WAIT (uaddr2/val3 unused).
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0i32,
        )
    };

    if ret == 0 {
        return Ok(FutexWait::Woken);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) => Ok(FutexWait::ValueChanged),
        Some(libc::ETIMEDOUT) => Ok(FutexWait::TimedOut),
        Some(libc::EINTR) => Ok(FutexWait::Interrupted),
        _ => Err(err),
    }
}

/// Wake up to `count` threads waiting on a futex word.
///
/// Returns the number of waiters woken.
#[cfg(target_os = "linux")]
pub fn futex_wake(addr: &AtomicU32, count: i32) -> io::Result<usize> {
    // SAFETY: addr is a live reference; FUTEX_WAKE ignores the timeout,
    // uaddr2 and val3 arguments.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            addr as *const AtomicU32 as *const u32,
            FUTEX_WAKE,
            count,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0i32,
        )
    };

    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

// Non-Linux fallback: bounded sleep instead of a kernel wait queue. Waiters
// re-check their condition after every return, so this degrades to a 10 ms
// poll rather than losing notifications.
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(addr: &AtomicU32, expected: u32, timeout: Option<Duration>) -> io::Result<FutexWait> {
    use std::sync::atomic::Ordering;

    if addr.load(Ordering::Acquire) != expected {
        return Ok(FutexWait::ValueChanged);
    }
    let slice = Duration::from_millis(10);
    match timeout {
        Some(t) if t <= slice => {
            std::thread::sleep(t);
            Ok(FutexWait::TimedOut)
        }
        _ => {
            std::thread::sleep(slice);
            Ok(FutexWait::Woken)
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_addr: &AtomicU32, _count: i32) -> io::Result<usize> {
    Ok(0)
}

/// Wake a single waiter
#[inline]
pub fn futex_wake_one(addr: &AtomicU32) -> io::Result<usize> {
    futex_wake(addr, 1)
}

/// Wake all waiters
#[inline]
pub fn futex_wake_all(addr: &AtomicU32) -> io::Result<usize> {
    futex_wake(addr, i32::MAX)
}
