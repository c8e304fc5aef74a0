//! Background refresher that keeps a published `ProgressRecord` current.
//!
//! Wakes on the store's change signal and on a fixed poll, so writes made
//! outside this process (another tab, a hand-edited file) still show up.

use std::time::Duration;

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use super::{ProgressRecord, ProgressStore};

/// Spawns the refresher. The task ends once every receiver is dropped.
pub fn spawn(store: ProgressStore, poll_every: Duration) -> (watch::Receiver<ProgressRecord>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(store.current_progress());
    let mut changes = store.subscribe();

    let handle = tokio::spawn(async move {
        let mut poll = time::interval(poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately once; the initial value is already published
        poll.tick().await;

        loop {
            let source = tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    "change"
                }
                _ = poll.tick() => "poll",
            };

            let next = store.current_progress();
            let updated = tx.send_if_modified(|current| {
                if *current != next {
                    *current = next;
                    true
                } else {
                    false
                }
            });
            if updated {
                debug!(target: "progress", %source, "Progress republished");
            }
            if tx.is_closed() {
                break;
            }
        }
        info!(target: "progress", "Progress watcher stopped");
    });

    (rx, handle)
}
