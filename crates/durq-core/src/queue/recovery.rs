//! Startup reset and reload of recoverable records.
//!
//! A reload pass walks recoverable ids oldest first, bounded by the queue's
//! capacity. Exhausted records are buried, the rest are admitted until the
//! first rejection; records left over keep their state for the next pass.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{AdmitError, DurableQueue, Rejection};
use crate::domain::DurqError;

/// What a reset or reload pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// `InFlight` records moved back to `Pending` (startup only).
    pub reset: u64,
    /// Recoverable ids considered.
    pub scanned: usize,
    /// Records now waiting in memory.
    pub admitted: usize,
    /// Exhausted records moved to `Dead`.
    pub dead: usize,
    /// Admissible records left untouched because capacity or the breaker ran out.
    pub deferred: usize,
    /// Records skipped because of a store or payload error.
    pub failed: usize,
}

impl RecoveryReport {
    /// Whether the pass stopped before the scan was exhausted.
    pub fn was_cut_short(&self) -> bool {
        self.deferred > 0
    }
}

pub struct RecoveryManager<M> {
    queue: Arc<DurableQueue<M>>,
}

impl<M: Send + 'static> RecoveryManager<M> {
    pub fn new(queue: Arc<DurableQueue<M>>) -> Self {
        Self { queue }
    }

    /// Startup sequence: reset interrupted records, then reload once.
    ///
    /// Never fails; problems are logged and show up in the report.
    pub async fn startup(&self) -> RecoveryReport {
        let reset = match self.queue.persistence().reset_interrupted().await {
            Ok(n) => {
                if n > 0 {
                    info!(count = n, "interrupted messages returned to pending");
                }
                n
            }
            Err(e) => {
                error!(error = %e, "failed to reset interrupted messages");
                0
            }
        };

        let report = RecoveryReport {
            reset,
            ..self.reload_pending().await
        };
        info!(?report, "startup recovery finished");
        report
    }

    /// Reloads up to `max_size` recoverable records into the queue.
    ///
    /// Safe to call repeatedly, and concurrently: a record is admitted only by
    /// the pass that atomically claims it (recoverable -> `InFlight`), so no
    /// record is held in memory twice. After the first rejection the pass stops
    /// admitting but still buries exhausted records.
    pub async fn reload_pending(&self) -> RecoveryReport {
        let persistence = self.queue.persistence();
        let retry = persistence.retry_policy();

        let ids = match persistence.list_recoverable_ids(self.queue.max_size()).await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "failed to list recoverable messages");
                return RecoveryReport::default();
            }
        };

        let mut report = RecoveryReport {
            scanned: ids.len(),
            ..RecoveryReport::default()
        };
        let mut rejected: Option<Rejection> = None;

        for id in ids {
            let loaded = match persistence.load(id).await {
                Ok(loaded) => loaded,
                // Taken by a concurrent pass or outcome between scan and load.
                Err(DurqError::RecordNotFound(_)) | Err(DurqError::NotRecoverable(..)) => {
                    debug!(msg_id = %id, "message no longer recoverable; skipped");
                    continue;
                }
                Err(e) => {
                    error!(msg_id = %id, error = %e, "failed to load message");
                    report.failed += 1;
                    continue;
                }
            };

            if retry.is_exhausted(loaded.exec_count) {
                match persistence.mark_dead(id).await {
                    Ok(true) => {
                        warn!(msg_id = %id, exec_count = loaded.exec_count, "exhausted message marked dead");
                        report.dead += 1;
                    }
                    Ok(false) => debug!(msg_id = %id, "message no longer recoverable; skipped"),
                    Err(e) => {
                        error!(msg_id = %id, error = %e, "failed to mark message dead");
                        report.failed += 1;
                    }
                }
                continue;
            }

            if rejected.is_some() {
                report.deferred += 1;
                continue;
            }

            match self.queue.admit_recovered(id, &loaded.content).await {
                Ok(()) => {
                    debug!(msg_id = %id, exec_count = loaded.exec_count, "message reloaded");
                    report.admitted += 1;
                }
                Err(AdmitError::Rejected(rejection)) => {
                    report.deferred += 1;
                    rejected = Some(rejection);
                }
                Err(AdmitError::Taken) => {
                    debug!(msg_id = %id, "message claimed by another pass; skipped");
                }
                Err(AdmitError::Failed(e)) => {
                    error!(msg_id = %id, error = %e, "failed to reload message");
                    report.failed += 1;
                }
            }
        }

        if let Some(rejection) = rejected {
            info!(%rejection, deferred = report.deferred, "reload admission stopped early");
        }
        if report.admitted > 0 || report.dead > 0 {
            info!(?report, "reload pass finished");
        }
        report
    }
}
