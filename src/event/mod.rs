//! Reconfigure pulses.
//!
//! Two sources feed the [`EventStreamer`]: the store event marker poll and
//! the gRPC relay stream. Each cluster manager registers one bounded
//! channel; a full channel already holds a pending pulse, so extra pulses
//! are dropped.

mod poller;
mod relay;

#[cfg(test)]
mod event_test;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
pub use poller::*;
pub use relay::*;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::trace;

/// A single "configuration changed" pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconfigure;

pub type ReconfigureSender = mpsc::Sender<Reconfigure>;
pub type ReconfigureReceiver = mpsc::Receiver<Reconfigure>;

pub fn reconfigure_channel(capacity: usize) -> (ReconfigureSender, ReconfigureReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Per-cluster registry of reconfigure handlers
#[derive(Debug, Default)]
pub struct EventStreamer {
    handlers: DashMap<String, ReconfigureSender>,
}

impl EventStreamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `cluster_id`. A second registration for the
    /// same cluster is ignored and returns false.
    pub fn register(
        &self,
        cluster_id: &str,
        handler: ReconfigureSender,
    ) -> bool {
        match self.handlers.entry(cluster_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(cluster_id, "reconfigure handler already registered");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
        }
    }

    /// Returns false when nothing was registered for `cluster_id`
    pub fn unregister(
        &self,
        cluster_id: &str,
    ) -> bool {
        self.handlers.remove(cluster_id).is_some()
    }

    pub fn is_registered(
        &self,
        cluster_id: &str,
    ) -> bool {
        self.handlers.contains_key(cluster_id)
    }

    /// Pulses one cluster. Returns whether a handler received it.
    pub fn notify(
        &self,
        cluster_id: &str,
    ) -> bool {
        match self.handlers.get(cluster_id) {
            Some(handler) => deliver(cluster_id, handler.value()),
            None => false,
        }
    }

    /// Pulses every registered cluster
    pub fn notify_all(&self) {
        for entry in self.handlers.iter() {
            deliver(entry.key(), entry.value());
        }
    }
}

fn deliver(
    cluster_id: &str,
    handler: &ReconfigureSender,
) -> bool {
    match handler.try_send(Reconfigure) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            trace!(cluster_id, "reconfigure already pending");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(cluster_id, "reconfigure handler is gone");
            false
        }
    }
}
