use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use super::EventStreamer;
use crate::storage::EventStore;

/// Watches the store's `last_update` marker and pulses every cluster when
/// it moves.
pub struct StoreEventPoller {
    store: Arc<dyn EventStore>,
    streamer: Arc<EventStreamer>,
    period: Duration,
}

impl StoreEventPoller {
    pub fn new(
        store: Arc<dyn EventStore>,
        streamer: Arc<EventStreamer>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            streamer,
            period,
        }
    }

    /// One poll. Updates `seen` and returns true when the marker changed.
    /// A store failure skips the cycle.
    pub async fn poll_once(
        &self,
        seen: &mut Option<u64>,
    ) -> bool {
        let current = match self.store.last_update().await {
            Ok(marker) => marker,
            Err(e) => {
                warn!("store_unavailable: reading last_update failed: {:?}", e);
                return false;
            }
        };
        if current == *seen {
            return false;
        }
        debug!(previous = ?seen, ?current, "store event marker moved");
        *seen = current;
        self.streamer.notify_all();
        true
    }

    pub async fn run(
        self,
        cancel: CancellationToken,
    ) -> crate::Result<()> {
        let mut seen = self.store.last_update().await.unwrap_or_else(|e| {
            warn!("store_unavailable: reading initial last_update failed: {:?}", e);
            None
        });
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("store event poller stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.poll_once(&mut seen).await;
                }
            }
        }
    }
}
