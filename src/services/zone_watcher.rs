//! Zone watcher - follows the persisted zone
//!
//! Polls the store and publishes the zone over a watch channel whenever it
//! differs from the last published value, so edits made by another process
//! (the `zone` subcommands) reach the tracker.

use crate::domain::zone::Zone;
use crate::io::store::ZoneStore;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

pub struct ZoneWatcher {
    store: ZoneStore,
    poll_interval: Duration,
    zone_tx: watch::Sender<Option<Zone>>,
}

impl ZoneWatcher {
    /// Create a watcher and the receiver the tracker listens on
    ///
    /// The receiver starts out holding whatever the store has now.
    pub fn new(store: ZoneStore, poll_interval: Duration) -> (Self, watch::Receiver<Option<Zone>>) {
        let (zone_tx, zone_rx) = watch::channel(store.load());
        (Self { store, poll_interval, zone_tx }, zone_rx)
    }

    /// Reload the store once; returns true when a new value was published
    pub fn poll(&self) -> bool {
        let zone = self.store.load();
        self.zone_tx.send_if_modified(|current| {
            if *current == zone {
                return false;
            }
            debug!(kind = %zone.as_ref().map(Zone::kind).unwrap_or("none"), "zone_store_changed");
            *current = zone;
            true
        })
    }

    /// Poll until shutdown or until every receiver is gone
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            path = %self.store.path().display(),
            poll_ms = %self.poll_interval.as_millis(),
            "zone_watcher_started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("zone_watcher_shutdown");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if self.zone_tx.is_closed() {
                        debug!("zone_watcher_no_receivers");
                        return;
                    }
                    self.poll();
                }
            }
        }
    }
}
