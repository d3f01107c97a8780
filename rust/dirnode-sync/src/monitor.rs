use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dirnode_core::{Cid, Record, Result};
use dirnode_db::{Database, SyncStatus};
use dirnode_store::StoreApi;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Registry-specific introspection the monitor needs and that this crate
/// cannot implement generically (spec.md §4.5 "Monitor"). A Zot-compatible
/// implementation lives alongside the gateway's registry client.
#[async_trait]
pub trait RegistryInspector: Send + Sync {
    /// CIDs that have newly landed in `repository` since the caller's last
    /// poll, excluding `already_known`.
    async fn list_new_manifests(
        &self,
        repository: &str,
        already_known: &HashSet<Cid>,
    ) -> Result<Vec<Cid>>;

    /// Whether the registry reports outstanding work for `remote_registry_url`'s
    /// sync extension. `None` if the registry exposes no such introspection,
    /// in which case the monitor falls back to the N-empty-polls heuristic
    /// (spec.md §9 "Open questions").
    async fn has_pending_upstream_work(&self, remote_registry_url: &str) -> Result<Option<bool>>;
}

/// Republishes labels for newly-ingested records onto the routing plane.
/// Optional: a no-op implementation is fine when routing is disabled.
#[async_trait]
pub trait LabelPublisher: Send + Sync {
    async fn republish(&self, cid: &Cid, record: &Record) -> Result<()>;
}

pub struct NoopLabelPublisher;

#[async_trait]
impl LabelPublisher for NoopLabelPublisher {
    async fn republish(&self, _cid: &Cid, _record: &Record) -> Result<()> {
        Ok(())
    }
}

/// How many consecutive empty/quiescent polls a `DELETE_PENDING` sync must
/// see before the monitor declares it `DELETED` (spec.md §8, invariant 5).
pub const DEFAULT_QUIESCENCE_WINDOW: u32 = 3;

/// Watches the local registry for records materialized by the sync
/// extension and keeps the records index current (spec.md §4.5). Runs
/// independently of the worker pool; concurrent fetches across all
/// monitored syncs share one semaphore sized to `worker_count` (spec.md
/// §4.5 "Back-pressure").
#[derive(Clone)]
pub struct Monitor {
    db: Database,
    store: Arc<dyn StoreApi>,
    inspector: Arc<dyn RegistryInspector>,
    publisher: Arc<dyn LabelPublisher>,
    fetch_semaphore: Arc<Semaphore>,
    check_interval: Duration,
    quiescence_window: u32,
}

impl Monitor {
    pub fn new(
        db: Database,
        store: Arc<dyn StoreApi>,
        inspector: Arc<dyn RegistryInspector>,
        publisher: Arc<dyn LabelPublisher>,
        worker_count: usize,
        check_interval: Duration,
    ) -> Self {
        Monitor {
            db,
            store,
            inspector,
            publisher,
            fetch_semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
            check_interval,
            quiescence_window: DEFAULT_QUIESCENCE_WINDOW,
        }
    }

    /// Begins watching `sync_id`'s repository, spawning a dedicated polling
    /// task. Returns immediately; the task runs until the sync reaches
    /// `DELETED` or its row disappears.
    pub fn start_sync_monitoring(&self, sync_id: Uuid, repository: String) {
        let monitor = self.clone();
        tokio::spawn(async move {
            if let Err(error) = monitor.watch(sync_id, repository).await {
                error!("sync {} monitor loop exited with error: {error}", sync_id);
            }
        });
    }

    async fn watch(&self, sync_id: Uuid, repository: String) -> Result<()> {
        let mut known: HashSet<Cid> = HashSet::new();
        let mut consecutive_quiescent_polls = 0u32;
        let mut ticker = tokio::time::interval(self.check_interval);

        loop {
            ticker.tick().await;

            let sync = match self.db.get_sync(sync_id).await {
                Ok(sync) => sync,
                Err(_) => {
                    debug!("sync {} no longer exists, stopping monitor", sync_id);
                    return Ok(());
                }
            };
            if sync.status == SyncStatus::Deleted {
                return Ok(());
            }

            let new_cids = self
                .inspector
                .list_new_manifests(&repository, &known)
                .await
                .unwrap_or_else(|error| {
                    warn!("sync {} failed to list new manifests: {error}", sync_id);
                    Vec::new()
                });

            for cid in &new_cids {
                known.insert(cid.clone());
            }
            self.ingest(&new_cids).await;

            if sync.status == SyncStatus::InProgress && !new_cids.is_empty() {
                if let Err(error) = self.db.update_sync_status(sync_id, SyncStatus::InSync).await {
                    debug!("sync {} status already advanced: {error}", sync_id);
                }
            }

            if sync.status != SyncStatus::DeletePending {
                continue;
            }

            let registry_reports_pending = self
                .inspector
                .has_pending_upstream_work(&repository)
                .await
                .unwrap_or(None);

            let quiescent = match registry_reports_pending {
                Some(pending) => !pending,
                None => new_cids.is_empty(),
            };

            if quiescent {
                consecutive_quiescent_polls += 1;
            } else {
                consecutive_quiescent_polls = 0;
            }

            if consecutive_quiescent_polls >= self.quiescence_window {
                info!("sync {} reached quiescence, marking DELETED", sync_id);
                self.db.update_sync_status(sync_id, SyncStatus::Deleted).await?;
                return Ok(());
            }
        }
    }

    async fn ingest(&self, cids: &[Cid]) {
        let mut handles = Vec::with_capacity(cids.len());
        for cid in cids {
            let permit = self.fetch_semaphore.clone().acquire_owned().await;
            let Ok(permit) = permit else { continue };
            let monitor = self.clone();
            let cid = cid.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                monitor.ingest_one(&cid).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn ingest_one(&self, cid: &Cid) {
        let record = match self.store.pull(cid).await {
            Ok(record) => record,
            Err(error) => {
                warn!("failed to fetch newly-landed record {cid}: {error}");
                return;
            }
        };
        if let Err(error) = self.db.upsert_record_index(cid, &record).await {
            warn!("failed to index newly-landed record {cid}: {error}");
            return;
        }
        if let Err(error) = self.publisher.republish(cid, &record).await {
            warn!("failed to republish labels for {cid}: {error}");
        }
    }
}
