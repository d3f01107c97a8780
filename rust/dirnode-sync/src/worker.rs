use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dirnode_db::{Database, SyncStatus};
use tokio::sync::mpsc;

use crate::job::SyncJob;
use crate::monitor::Monitor;
use crate::registry_config::{self, tag_filter_for, SyncContentFilter, SyncTagFilter, SyncUpstream};
use crate::remote::RemoteDirectoryClient;

/// Per-item timeout budget a worker allows a single [SyncJob] (spec.md §5).
pub struct WorkerConfig {
    pub worker_timeout: Duration,
    pub registry_config_path: PathBuf,
    pub credentials_dir: PathBuf,
    pub repository: String,
    pub requesting_node_id: String,
}

/// N worker tasks draining the scheduler's bounded queue (spec.md §4.5
/// "Workers"). Each job is handled end-to-end by whichever worker task
/// receives it; there is no per-sync affinity.
pub struct WorkerPool {
    db: Database,
    remote_client: Arc<dyn RemoteDirectoryClient>,
    monitor: Monitor,
    config: Arc<WorkerConfig>,
}

impl WorkerPool {
    pub fn new(
        db: Database,
        remote_client: Arc<dyn RemoteDirectoryClient>,
        monitor: Monitor,
        config: WorkerConfig,
    ) -> Self {
        WorkerPool {
            db,
            remote_client,
            monitor,
            config: Arc::new(config),
        }
    }

    /// Spawns `worker_count` tasks pulling from `queue` until it closes.
    pub fn spawn(&self, worker_count: usize, queue: mpsc::Receiver<SyncJob>) {
        let queue = Arc::new(tokio::sync::Mutex::new(queue));
        for index in 0..worker_count.max(1) {
            let db = self.db.clone();
            let remote_client = self.remote_client.clone();
            let monitor = self.monitor.clone();
            let config = self.config.clone();
            let queue = queue.clone();

            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut queue = queue.lock().await;
                        queue.recv().await
                    };
                    let Some(job) = job else {
                        debug!("worker {} exiting, queue closed", index);
                        return;
                    };

                    let outcome = tokio::time::timeout(
                        config.worker_timeout,
                        handle_job(&db, &remote_client, &monitor, &config, job.clone()),
                    )
                    .await;

                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => warn!("worker {} job {} failed: {error}", index, job),
                        Err(_) => warn!("worker {} job {} timed out", index, job),
                    }
                }
            });
        }
    }
}

async fn handle_job(
    db: &Database,
    remote_client: &Arc<dyn RemoteDirectoryClient>,
    monitor: &Monitor,
    config: &WorkerConfig,
    job: SyncJob,
) -> dirnode_core::Result<()> {
    match job {
        SyncJob::SyncCreate { sync_id } => handle_sync_create(db, remote_client, monitor, config, sync_id).await,
        SyncJob::SyncDelete { sync_id } => handle_sync_delete(db, config, sync_id).await,
    }
}

async fn handle_sync_create(
    db: &Database,
    remote_client: &Arc<dyn RemoteDirectoryClient>,
    monitor: &Monitor,
    config: &WorkerConfig,
    sync_id: uuid::Uuid,
) -> dirnode_core::Result<()> {
    let sync = db.get_sync(sync_id).await?;

    let credentials = match retry_on_unavailable(3, || {
        remote_client.request_registry_credentials(&sync.remote_directory_url, &config.requesting_node_id)
    })
    .await
    {
        Ok(credentials) => credentials,
        Err(error) => {
            error!("sync {} credential negotiation failed: {error}", sync_id);
            db.update_sync_status(sync_id, SyncStatus::Failed).await?;
            return Err(error);
        }
    };

    db.update_sync_remote_registry(sync_id, &credentials.remote_registry_url).await?;

    let credentials_file = config.credentials_dir.join(format!("{sync_id}.json"));
    registry_config::write_credentials_file(
        &credentials_file,
        &credentials.basic_auth.username,
        &credentials.basic_auth.password,
    )
    .await?;

    let mut registry_config = registry_config::read_config(&config.registry_config_path).await?;
    registry_config::upsert_upstream(
        &mut registry_config,
        SyncUpstream {
            urls: vec![credentials.remote_registry_url.clone()],
            on_demand: false,
            poll_interval: "30s".to_string(),
            max_retries: 3,
            retry_delay: "5s".to_string(),
            tls_verify: true,
            content: vec![SyncContentFilter {
                prefix: config.repository.clone(),
                tags: SyncTagFilter { regex: tag_filter_for(&sync.cids) },
            }],
            credentials_file: credentials_file.display().to_string(),
        },
    );
    registry_config::write_config(&config.registry_config_path, &registry_config).await?;

    monitor.start_sync_monitoring(sync_id, config.repository.clone());
    info!("sync {} dispatched to {}", sync_id, credentials.remote_registry_url);
    Ok(())
}

async fn handle_sync_delete(
    db: &Database,
    config: &WorkerConfig,
    sync_id: uuid::Uuid,
) -> dirnode_core::Result<()> {
    let sync = db.get_sync(sync_id).await?;
    let Some(remote_registry_url) = sync.remote_registry_url else {
        // Never reconfigured a registry; nothing to remove.
        return Ok(());
    };

    let mut registry_config = registry_config::read_config(&config.registry_config_path).await?;
    registry_config::remove_upstream(&mut registry_config, &remote_registry_url);
    registry_config::write_config(&config.registry_config_path, &registry_config).await?;

    // The monitor, not this worker, sets DELETED once it observes
    // quiescence (spec.md §4.5 "SyncDelete" step 3).
    info!("sync {} upstream removed, awaiting monitor quiescence", sync_id);
    Ok(())
}

async fn retry_on_unavailable<F, Fut, T>(max_attempts: u32, mut operation: F) -> dirnode_core::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = dirnode_core::Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let backoff = Duration::from_millis(200 * 2u64.pow(attempt - 1));
                debug!("retrying after {:?} (attempt {attempt}/{max_attempts}): {error}", backoff);
                tokio::time::sleep(backoff).await;
            }
            Err(error) => return Err(error),
        }
    }
}
