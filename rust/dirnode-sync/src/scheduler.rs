use std::time::Duration;

use dirnode_core::Result;
use dirnode_db::{Database, SyncStatus};
use tokio::sync::mpsc;

use crate::job::SyncJob;

/// Polls the database at `scheduler_interval` and dispatches work onto a
/// bounded channel (spec.md §4.5). Status transitions double as the lock
/// that keeps a `sync_id` from having more than one in-flight work item
/// (spec.md §8, invariant 4).
pub struct Scheduler {
    db: Database,
    queue: mpsc::Sender<SyncJob>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(db: Database, queue: mpsc::Sender<SyncJob>, interval: Duration) -> Self {
        Scheduler { db, queue, interval }
    }

    /// Runs ticks until `shutdown` resolves. Intended to be spawned as its
    /// own task; see `dirnode-gateway`'s graceful-shutdown wiring.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.tick().await {
                        error!("scheduler tick failed: {error}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Runs a single scheduling pass. Exposed separately from [Scheduler::run]
    /// so tests can drive it deterministically.
    pub async fn tick(&self) -> Result<()> {
        for sync in self.db.get_syncs_by_status(SyncStatus::Pending).await? {
            if let Err(error) = self.db.update_sync_status(sync.id, SyncStatus::InProgress).await {
                debug!("sync {} no longer PENDING, skipping: {error}", sync.id);
                continue;
            }

            match self.queue.try_send(SyncJob::SyncCreate { sync_id: sync.id }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("worker queue full, deferring sync {} back to PENDING", sync.id);
                    // Best-effort revert; if this also fails the row simply
                    // stays IN_PROGRESS until the next tick's idempotent retry.
                    let _ = self.db.update_sync_status(sync.id, SyncStatus::Pending).await;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("worker queue closed, scheduler cannot dispatch further work");
                    return Ok(());
                }
            }
        }

        for sync in self.db.get_syncs_by_status(SyncStatus::DeletePending).await? {
            match self.queue.try_send(SyncJob::SyncDelete { sync_id: sync.id }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("worker queue full, will retry SyncDelete for {} next tick", sync.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_sync_transitions_to_in_progress_and_is_dispatched() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example", &[]).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = Scheduler::new(db.clone(), tx, Duration::from_secs(60));
        scheduler.tick().await.unwrap();

        assert_eq!(db.get_sync(id).await.unwrap().status, SyncStatus::InProgress);
        let job = rx.try_recv().unwrap();
        assert!(matches!(job, SyncJob::SyncCreate { sync_id } if sync_id == id));
    }

    #[tokio::test]
    async fn full_queue_reverts_sync_to_pending() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example", &[]).await.unwrap();

        let (tx, _rx) = mpsc::channel(1);
        // Fill the queue so the scheduler's try_send fails.
        tx.try_send(SyncJob::SyncCreate { sync_id: uuid::Uuid::new_v4() }).unwrap();

        let scheduler = Scheduler::new(db.clone(), tx, Duration::from_secs(60));
        scheduler.tick().await.unwrap();

        assert_eq!(db.get_sync(id).await.unwrap().status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn delete_pending_syncs_are_dispatched_without_status_change() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example", &[]).await.unwrap();
        db.update_sync_status(id, SyncStatus::InProgress).await.unwrap();
        db.delete_sync(id).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let scheduler = Scheduler::new(db.clone(), tx, Duration::from_secs(60));
        scheduler.tick().await.unwrap();

        assert_eq!(db.get_sync(id).await.unwrap().status, SyncStatus::DeletePending);
        let job = rx.try_recv().unwrap();
        assert!(matches!(job, SyncJob::SyncDelete { sync_id } if sync_id == id));
    }
}
