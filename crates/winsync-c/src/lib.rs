// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # winsync C FFI Bindings
//!
//! C-compatible entry points for embedding runtimes: window lifecycle hooks
//! and subscriber registration, with delivery through a C function pointer.
//!
//! # Usage from C
//!
//! ```c
//! bool post_count(int64_t port, int64_t count, void* user_data) {
//!     return my_runtime_post(user_data, port, count);
//! }
//!
//! WinsyncHandle* sync = NULL;
//! if (winsync_create("my_app", WINSYNC_OPEN_FALLBACK, post_count, ctx, &sync) == WINSYNC_OK) {
//!     winsync_register_subscriber(sync, port);
//!     winsync_window_created(sync);
//!     /* ... */
//!     winsync_destroy(sync);
//! }
//! ```
//!
//! # Safety
//!
//! All public functions are `unsafe` and require the caller to uphold the
//! invariants documented in each function's safety comment. The delivery
//! callback runs on the listener thread and must not block.

mod logging;

pub use logging::*;

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use winsync::{Deliver, DeliveryError, SubscriberHandle, SyncConfig, SyncError, WindowSync};

/// Returned by the count functions when the handle is NULL or shut down
pub const WINSYNC_COUNT_NOT_INITIALIZED: i32 = -2_147_483_648;

/// Opaque handle to a window sync instance
#[repr(C)]
pub struct WinsyncHandle {
    _private: [u8; 0],
}

/// Error codes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinsyncError {
    /// Operation completed successfully
    WinsyncOk = 0,
    /// NULL pointer, invalid UTF-8 or missing callback
    WinsyncInvalidArgument = 1,
    /// Configuration rejected
    WinsyncConfigError = 2,
    /// Shared memory or signal could not be set up
    WinsyncResourceError = 3,
    /// Listener thread could not be spawned
    WinsyncThreadError = 4,
    /// Subscriber registry is full
    WinsyncRegistryFull = 5,
    /// Generic operation failure
    WinsyncOperationFailed = 6,
}

impl From<&SyncError> for WinsyncError {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::Resource { .. } => Self::WinsyncResourceError,
            SyncError::ThreadSpawn(_) => Self::WinsyncThreadError,
            SyncError::RegistryFull { .. } => Self::WinsyncRegistryFull,
            SyncError::InvalidConfig(_) => Self::WinsyncConfigError,
        }
    }
}

/// How `winsync_create` treats unavailable shared memory
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinsyncOpenMode {
    /// Cross-process, falling back to a process-local counter
    WinsyncOpenFallback = 0,
    /// Cross-process or fail with `WINSYNC_RESOURCE_ERROR`
    WinsyncOpenStrict = 1,
    /// Process-local counter only
    WinsyncOpenLocal = 2,
}

/// Delivery callback: post `count` to the endpoint `handle`.
///
/// Return `false` when the endpoint is gone; the subscriber stays
/// registered.
pub type WinsyncDeliverFn =
    Option<unsafe extern "C" fn(handle: i64, count: i64, user_data: *mut c_void) -> bool>;

/// Caller-owned context passed back to the callback
struct UserData(*mut c_void);

// SAFETY: the pointer is never dereferenced on the Rust side; the C caller
// guarantees it may be used from the listener thread.
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

struct ForeignSink {
    callback: unsafe extern "C" fn(i64, i64, *mut c_void) -> bool,
    user_data: UserData,
}

impl Deliver for ForeignSink {
    fn deliver(&self, handle: SubscriberHandle, count: i32) -> Result<(), DeliveryError> {
        // SAFETY: the callback and user_data were supplied together to
        // winsync_create and stay valid until winsync_destroy.
        let posted = unsafe { (self.callback)(handle, i64::from(count), self.user_data.0) };
        if posted {
            Ok(())
        } else {
            Err(DeliveryError::Rejected("callback returned false".into()))
        }
    }
}

unsafe fn sync_ref<'a>(handle: *mut WinsyncHandle) -> Option<&'a WindowSync> {
    handle.cast::<WindowSync>().as_ref()
}

/// Create a window sync instance.
///
/// `WINSYNC_*` environment variables are applied first; a non-NULL `app_id`
/// overrides `WINSYNC_APP_ID`.
///
/// # Safety
/// - `app_id` must be NULL or a valid null-terminated C string.
/// - `deliver` and `user_data` must stay valid until `winsync_destroy`.
/// - `out` must be a valid pointer; on success it receives a handle that
///   must be released with `winsync_destroy`.
#[no_mangle]
pub unsafe extern "C" fn winsync_create(
    app_id: *const c_char,
    mode: WinsyncOpenMode,
    deliver: WinsyncDeliverFn,
    user_data: *mut c_void,
    out: *mut *mut WinsyncHandle,
) -> WinsyncError {
    if out.is_null() {
        return WinsyncError::WinsyncInvalidArgument;
    }
    *out = ptr::null_mut();

    let Some(callback) = deliver else {
        return WinsyncError::WinsyncInvalidArgument;
    };

    let mut config = SyncConfig::from_env();
    if !app_id.is_null() {
        let Ok(id) = CStr::from_ptr(app_id).to_str() else {
            return WinsyncError::WinsyncInvalidArgument;
        };
        config.app_id = id.to_string();
    }

    let sink: Arc<dyn Deliver> = Arc::new(ForeignSink {
        callback,
        user_data: UserData(user_data),
    });

    let opened = match mode {
        WinsyncOpenMode::WinsyncOpenFallback => WindowSync::open(config, sink),
        WinsyncOpenMode::WinsyncOpenStrict => WindowSync::open_strict(config, sink),
        WinsyncOpenMode::WinsyncOpenLocal => WindowSync::local(config, sink),
    };

    match opened {
        Ok(sync) => {
            *out = Box::into_raw(Box::new(sync)).cast::<WinsyncHandle>();
            WinsyncError::WinsyncOk
        }
        Err(e) => {
            log::error!("[SYNC] winsync_create failed: {}", e);
            WinsyncError::from(&e)
        }
    }
}

/// Stop the listener, unmap and free the handle.
///
/// # Safety
/// - `handle` must be NULL or a handle from `winsync_create`, not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn winsync_destroy(handle: *mut WinsyncHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle.cast::<WindowSync>()));
    }
}

/// A window opened. Returns the new count or `WINSYNC_COUNT_NOT_INITIALIZED`.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_window_created(handle: *mut WinsyncHandle) -> i32 {
    sync_ref(handle).map_or(WINSYNC_COUNT_NOT_INITIALIZED, WindowSync::on_window_created)
}

/// A window closed. Returns the new count or `WINSYNC_COUNT_NOT_INITIALIZED`.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_window_destroyed(handle: *mut WinsyncHandle) -> i32 {
    sync_ref(handle).map_or(WINSYNC_COUNT_NOT_INITIALIZED, WindowSync::on_window_destroyed)
}

/// Current count, or `WINSYNC_COUNT_NOT_INITIALIZED` for a NULL handle.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_window_count(handle: *mut WinsyncHandle) -> i32 {
    sync_ref(handle).map_or(WINSYNC_COUNT_NOT_INITIALIZED, WindowSync::window_count)
}

/// Join the broadcast set; the current count is delivered right away.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_register_subscriber(
    handle: *mut WinsyncHandle,
    subscriber: i64,
) -> bool {
    sync_ref(handle).is_some_and(|s| s.register_subscriber(subscriber))
}

/// Leave the broadcast set. Returns whether the subscriber was registered.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_unregister_subscriber(
    handle: *mut WinsyncHandle,
    subscriber: i64,
) -> bool {
    sync_ref(handle).is_some_and(|s| s.unregister_subscriber(subscriber))
}

/// True when the count is shared with other processes.
///
/// # Safety
/// - `handle` must be NULL or a valid handle from `winsync_create`.
#[no_mangle]
pub unsafe extern "C" fn winsync_is_cross_process(handle: *mut WinsyncHandle) -> bool {
    sync_ref(handle).is_some_and(WindowSync::is_cross_process)
}
