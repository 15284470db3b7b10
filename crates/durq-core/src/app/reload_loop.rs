//! ReloadLoop - periodic reload of the recoverable backlog.
//!
//! Startup recovery admits at most `max_size` records and failed attempts go
//! back to the store as `RetryEligible`; this loop picks both up. It never
//! resets `InFlight` records, those belong to the running process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::queue::RecoveryManager;

pub struct ReloadLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReloadLoop {
    /// First pass runs one `interval` from now; startup already did one.
    pub fn spawn<M>(recovery: Arc<RecoveryManager<M>>, interval: Duration) -> Self
    where
        M: Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(?interval, "reload loop started");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticks.tick() => {
                        recovery.reload_pending().await;
                    }
                }
            }
            debug!("reload loop stopped");
        });

        Self { shutdown_tx, join }
    }

    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "reload loop ended abnormally");
        }
    }
}
