// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy for window count synchronization.
//!
//! | Kind | Surfaced as | Propagation |
//! |------|-------------|-------------|
//! | resource failure | [`SyncError::Resource`] | returned from `initialize()` / `start()` |
//! | use before init | [`NotInitialized`] / [`crate::COUNT_NOT_INITIALIZED`] | returned, never raised |
//! | failed delivery | [`DeliveryError`] | logged and reported, never propagated |

use crate::shm::ShmError;
use std::fmt;
use std::io;

/// Which named resource could not be set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The counter segment
    Counter,
    /// The change signal segment
    Signal,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "window counter"),
            Self::Signal => write!(f, "change signal"),
        }
    }
}

/// Errors that make a component unusable
#[derive(Debug)]
pub enum SyncError {
    /// A named segment could not be created, opened or mapped
    Resource { resource: Resource, source: ShmError },

    /// The listener thread could not be spawned
    ThreadSpawn(io::Error),

    /// The subscriber registry is at capacity
    RegistryFull { capacity: usize },

    /// Configuration rejected by `SyncConfig::validate`
    InvalidConfig(String),
}

impl SyncError {
    /// True for the failures after which a local-only fallback makes sense
    #[must_use]
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource { resource, source } => {
                write!(f, "Failed to set up {resource}: {source}")
            }
            Self::ThreadSpawn(e) => write!(f, "Failed to spawn listener thread: {e}"),
            Self::RegistryFull { capacity } => {
                write!(f, "Subscriber registry full ({capacity} handles)")
            }
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resource { source, .. } => Some(source),
            Self::ThreadSpawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Counter used before `initialize()` succeeded (or after `shutdown()`).
///
/// Zero-sized so the hot path stays allocation-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotInitialized;

impl fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Window counter used before initialization")
    }
}

impl std::error::Error for NotInitialized {}

/// A single subscriber failed to receive a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The delivery mechanism has no endpoint for this handle
    NoEndpoint,
    /// The far end is gone
    Disconnected,
    /// The delivery mechanism refused the message
    Rejected(String),
    /// The delivery mechanism panicked
    Panicked,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEndpoint => write!(f, "no endpoint for subscriber handle"),
            Self::Disconnected => write!(f, "subscriber endpoint disconnected"),
            Self::Rejected(reason) => write!(f, "delivery rejected: {reason}"),
            Self::Panicked => write!(f, "delivery panicked"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Result type for fallible setup operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_resource_error_chain() {
        let err = SyncError::Resource {
            resource: Resource::Counter,
            source: ShmError::NotReady("/x".into()),
        };
        assert!(err.is_resource());
        assert!(err.to_string().starts_with("Failed to set up window counter"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_non_resource_errors() {
        let err = SyncError::RegistryFull { capacity: 4 };
        assert!(!err.is_resource());
        assert_eq!(err.to_string(), "Subscriber registry full (4 handles)");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_delivery_error_display() {
        assert_eq!(
            DeliveryError::Rejected("port closed".into()).to_string(),
            "delivery rejected: port closed"
        );
        assert_eq!(NotInitialized.to_string(), "Window counter used before initialization");
    }
}
