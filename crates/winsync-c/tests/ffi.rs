// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! C entry points driven from Rust through the exported symbols.

use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use winsync_c::*;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(i64, i64)>>,
    accept: bool,
}

unsafe extern "C" fn record(handle: i64, count: i64, user_data: *mut c_void) -> bool {
    let recorder = &*(user_data as *const Recorder);
    recorder
        .seen
        .lock()
        .expect("recorder lock")
        .push((handle, count));
    recorder.accept
}

fn wait_for(recorder: &Recorder, want: (i64, i64)) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if recorder.seen.lock().expect("recorder lock").contains(&want) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn create_local(recorder: &Recorder, app: &str) -> *mut WinsyncHandle {
    let app_id = CString::new(app).expect("app id");
    let mut handle = ptr::null_mut();
    let rc = unsafe {
        winsync_create(
            app_id.as_ptr(),
            WinsyncOpenMode::WinsyncOpenLocal,
            Some(record),
            recorder as *const Recorder as *mut c_void,
            &mut handle,
        )
    };
    assert_eq!(rc, WinsyncError::WinsyncOk);
    assert!(!handle.is_null());
    handle
}

#[test]
fn test_local_round_trip() {
    let recorder = Recorder {
        accept: true,
        ..Default::default()
    };
    let handle = create_local(&recorder, "ffi_round_trip");

    unsafe {
        assert!(!winsync_is_cross_process(handle));
        assert_eq!(winsync_window_count(handle), 0);

        assert!(winsync_register_subscriber(handle, 77));
        assert!(wait_for(&recorder, (77, 0)));

        assert_eq!(winsync_window_created(handle), 1);
        assert!(wait_for(&recorder, (77, 1)));

        assert_eq!(winsync_window_destroyed(handle), 0);
        assert!(winsync_unregister_subscriber(handle, 77));
        assert!(!winsync_unregister_subscriber(handle, 77));

        winsync_destroy(handle);
    }
}

#[test]
fn test_rejecting_callback_keeps_subscriber() {
    let recorder = Recorder::default();
    let handle = create_local(&recorder, "ffi_reject");

    unsafe {
        // Registration succeeds even though the initial delivery is refused.
        assert!(winsync_register_subscriber(handle, 5));
        assert!(wait_for(&recorder, (5, 0)));

        winsync_window_created(handle);
        assert!(wait_for(&recorder, (5, 1)));
        assert!(winsync_unregister_subscriber(handle, 5));

        winsync_destroy(handle);
    }
}

#[test]
fn test_null_handle_is_safe() {
    unsafe {
        assert_eq!(winsync_window_created(ptr::null_mut()), WINSYNC_COUNT_NOT_INITIALIZED);
        assert_eq!(winsync_window_destroyed(ptr::null_mut()), WINSYNC_COUNT_NOT_INITIALIZED);
        assert_eq!(winsync_window_count(ptr::null_mut()), WINSYNC_COUNT_NOT_INITIALIZED);
        assert!(!winsync_register_subscriber(ptr::null_mut(), 1));
        assert!(!winsync_unregister_subscriber(ptr::null_mut(), 1));
        assert!(!winsync_is_cross_process(ptr::null_mut()));
        winsync_destroy(ptr::null_mut());
    }
}

#[test]
fn test_create_rejects_bad_arguments() {
    let recorder = Recorder::default();
    let user_data = &recorder as *const Recorder as *mut c_void;
    let mut handle = ptr::null_mut();

    unsafe {
        assert_eq!(
            winsync_create(
                ptr::null(),
                WinsyncOpenMode::WinsyncOpenLocal,
                None,
                user_data,
                &mut handle,
            ),
            WinsyncError::WinsyncInvalidArgument
        );
        assert!(handle.is_null());

        assert_eq!(
            winsync_create(
                ptr::null(),
                WinsyncOpenMode::WinsyncOpenLocal,
                Some(record),
                user_data,
                ptr::null_mut(),
            ),
            WinsyncError::WinsyncInvalidArgument
        );

        let empty = CString::new("").expect("empty id");
        assert_eq!(
            winsync_create(
                empty.as_ptr(),
                WinsyncOpenMode::WinsyncOpenLocal,
                Some(record),
                user_data,
                &mut handle,
            ),
            WinsyncError::WinsyncConfigError
        );
        assert!(handle.is_null());
    }
}
