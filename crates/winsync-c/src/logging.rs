// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging initialization for the C FFI

use super::WinsyncError;

/// Log level
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinsyncLogLevel {
    WinsyncLogOff = 0,
    WinsyncLogError = 1,
    WinsyncLogWarn = 2,
    WinsyncLogInfo = 3,
    WinsyncLogDebug = 4,
    WinsyncLogTrace = 5,
}

impl From<WinsyncLogLevel> for log::LevelFilter {
    fn from(level: WinsyncLogLevel) -> Self {
        match level {
            WinsyncLogLevel::WinsyncLogOff => log::LevelFilter::Off,
            WinsyncLogLevel::WinsyncLogError => log::LevelFilter::Error,
            WinsyncLogLevel::WinsyncLogWarn => log::LevelFilter::Warn,
            WinsyncLogLevel::WinsyncLogInfo => log::LevelFilter::Info,
            WinsyncLogLevel::WinsyncLogDebug => log::LevelFilter::Debug,
            WinsyncLogLevel::WinsyncLogTrace => log::LevelFilter::Trace,
        }
    }
}

/// Initialize console logging at `level`.
///
/// # Safety
/// Must be called from a single thread during initialization.
///
/// # Returns
/// `WINSYNC_OK`, or `WINSYNC_OPERATION_FAILED` if a logger is already installed
#[no_mangle]
pub unsafe extern "C" fn winsync_logging_init(level: WinsyncLogLevel) -> WinsyncError {
    let filter: log::LevelFilter = level.into();

    match env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp_millis()
        .try_init()
    {
        Ok(()) => WinsyncError::WinsyncOk,
        Err(_) => WinsyncError::WinsyncOperationFailed,
    }
}

/// Initialize console logging from `RUST_LOG`, or `default_level` when unset.
///
/// # Safety
/// Must be called from a single thread during initialization.
#[no_mangle]
pub unsafe extern "C" fn winsync_logging_init_env(default_level: WinsyncLogLevel) -> WinsyncError {
    let filter: log::LevelFilter = default_level.into();

    match env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(filter.to_string()),
    )
    .format_timestamp_millis()
    .try_init()
    {
        Ok(()) => WinsyncError::WinsyncOk,
        Err(_) => WinsyncError::WinsyncOperationFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(
            log::LevelFilter::from(WinsyncLogLevel::WinsyncLogOff),
            log::LevelFilter::Off
        );
        assert_eq!(
            log::LevelFilter::from(WinsyncLogLevel::WinsyncLogDebug),
            log::LevelFilter::Debug
        );
    }

    #[test]
    fn test_second_init_fails() {
        // SAFETY: test thread; the first call may or may not win against
        // other tests, the second can never succeed.
        unsafe {
            let _ = winsync_logging_init(WinsyncLogLevel::WinsyncLogWarn);
            assert_eq!(
                winsync_logging_init_env(WinsyncLogLevel::WinsyncLogInfo),
                WinsyncError::WinsyncOperationFailed
            );
        }
    }
}
