// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel-backed delivery endpoints for in-process subscribers.
//!
//! Each handle maps to the sending half of a crossbeam channel; the
//! subscriber keeps the receiver and drains it on whatever thread it owns.

use crate::error::DeliveryError;
use crate::registry::{Deliver, SubscriberHandle};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use dashmap::DashMap;

/// [`Deliver`] implementation over per-handle channels.
#[derive(Debug, Default)]
pub struct ChannelSink {
    endpoints: DashMap<SubscriberHandle, Sender<i32>>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the unbounded endpoint for `handle`.
    pub fn endpoint(&self, handle: SubscriberHandle) -> Receiver<i32> {
        let (tx, rx) = channel::unbounded();
        self.endpoints.insert(handle, tx);
        rx
    }

    /// Create (or replace) a bounded endpoint; deliveries to a full queue
    /// fail with [`DeliveryError::Rejected`].
    pub fn bounded_endpoint(&self, handle: SubscriberHandle, cap: usize) -> Receiver<i32> {
        let (tx, rx) = channel::bounded(cap);
        self.endpoints.insert(handle, tx);
        rx
    }

    /// Forget the endpoint for `handle`. Returns whether one existed.
    pub fn remove(&self, handle: SubscriberHandle) -> bool {
        self.endpoints.remove(&handle).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Deliver for ChannelSink {
    fn deliver(&self, handle: SubscriberHandle, count: i32) -> Result<(), DeliveryError> {
        let tx = self.endpoints.get(&handle).ok_or(DeliveryError::NoEndpoint)?;
        tx.try_send(count).map_err(|e| match e {
            TrySendError::Disconnected(_) => DeliveryError::Disconnected,
            TrySendError::Full(_) => DeliveryError::Rejected("endpoint queue full".into()),
        })
    }
}
