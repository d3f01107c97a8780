use chrono::{DateTime, Utc};
use dirnode_core::{Cid, Error, Result};
use uuid::Uuid;

use crate::db::Database;
use crate::error::map_sqlx_error;
use crate::status::SyncStatus;

/// A durable sync row (spec.md §3). `cids` is non-empty only for a partial
/// sync (spec.md §8, scenario S5); an empty list means "mirror everything".
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRow {
    pub id: Uuid,
    pub remote_directory_url: String,
    pub remote_registry_url: Option<String>,
    pub status: SyncStatus,
    pub cids: Vec<Cid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SyncRecord {
    id: String,
    remote_directory_url: String,
    remote_registry_url: Option<String>,
    status: String,
    cids: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SyncRecord> for SyncRow {
    type Error = Error;

    fn try_from(row: SyncRecord) -> Result<Self> {
        let cids: Vec<String> = serde_json::from_str(&row.cids)?;
        let cids = cids
            .into_iter()
            .map(|c| c.parse())
            .collect::<Result<Vec<Cid>>>()?;
        Ok(SyncRow {
            id: Uuid::parse_str(&row.id)
                .map_err(|error| Error::Internal(anyhow::anyhow!("malformed sync id: {error}")))?,
            remote_directory_url: row.remote_directory_url,
            remote_registry_url: row.remote_registry_url,
            status: row
                .status
                .parse()
                .map_err(|_| Error::Internal(anyhow::anyhow!("malformed sync status")))?,
            cids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Database {
    /// Creates a sync row in `PENDING`. See spec.md §4.5 scheduler.
    pub async fn create_sync(
        &self,
        remote_directory_url: &str,
        cids: &[Cid],
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let cids_json = serde_json::to_string(&cids.iter().map(Cid::to_string).collect::<Vec<_>>())?;

        sqlx::query(
            "INSERT INTO syncs (id, remote_directory_url, remote_registry_url, status, cids, created_at, updated_at)
             VALUES (?, ?, NULL, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(remote_directory_url)
        .bind(SyncStatus::Pending.to_string())
        .bind(cids_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("create_sync", error))?;

        info!("created sync {} for {}", id, remote_directory_url);
        Ok(id)
    }

    pub async fn get_sync(&self, id: Uuid) -> Result<SyncRow> {
        let record: Option<SyncRecord> = sqlx::query_as(
            "SELECT id, remote_directory_url, remote_registry_url, status, cids, created_at, updated_at
             FROM syncs WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("get_sync", error))?;

        record
            .ok_or_else(|| Error::NotFound(format!("sync {id}")))?
            .try_into()
    }

    pub async fn get_syncs_by_status(&self, status: SyncStatus) -> Result<Vec<SyncRow>> {
        let records: Vec<SyncRecord> = sqlx::query_as(
            "SELECT id, remote_directory_url, remote_registry_url, status, cids, created_at, updated_at
             FROM syncs WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("get_syncs_by_status", error))?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn list_syncs(&self, limit: i64, offset: i64) -> Result<Vec<SyncRow>> {
        let records: Vec<SyncRecord> = sqlx::query_as(
            "SELECT id, remote_directory_url, remote_registry_url, status, cids, created_at, updated_at
             FROM syncs ORDER BY created_at ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("list_syncs", error))?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// Guarded status transition: the compare-and-transition happens inside
    /// a single SQL statement (`WHERE status = <current>`), so this doubles
    /// as the "implicit lock" described in spec.md §5 — two schedulers
    /// racing on the same row will see only one successful UPDATE.
    pub async fn update_sync_status(&self, id: Uuid, to: SyncStatus) -> Result<()> {
        let current = self.get_sync(id).await?.status;
        if !current.can_transition_to(to) {
            return Err(Error::FailedPrecondition(format!(
                "sync {id} cannot transition from {current} to {to}"
            )));
        }

        let result = sqlx::query(
            "UPDATE syncs SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(current.to_string())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("update_sync_status", error))?;

        if result.rows_affected() == 0 {
            return Err(Error::FailedPrecondition(format!(
                "sync {id} status changed concurrently; retry"
            )));
        }

        debug!("sync {} transitioned {} -> {}", id, current, to);
        Ok(())
    }

    pub async fn update_sync_remote_registry(&self, id: Uuid, url: &str) -> Result<()> {
        sqlx::query("UPDATE syncs SET remote_registry_url = ?, updated_at = ? WHERE id = ?")
            .bind(url)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("update_sync_remote_registry", error))?;
        Ok(())
    }

    /// Marks the sync `DELETE_PENDING`; never deletes the row directly
    /// (spec.md §4.3).
    pub async fn delete_sync(&self, id: Uuid) -> Result<()> {
        self.update_sync_status(id, SyncStatus::DeletePending).await
    }

    /// Permanently removes a `DELETED` sync row. Called by the monitor
    /// after quiescence, never by `DeleteSync` itself.
    pub async fn purge_deleted_sync(&self, id: Uuid) -> Result<()> {
        let current = self.get_sync(id).await?.status;
        if current != SyncStatus::Deleted {
            return Err(Error::FailedPrecondition(format!(
                "sync {id} must be DELETED before it can be purged, was {current}"
            )));
        }
        sqlx::query("DELETE FROM syncs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("purge_deleted_sync", error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example/directory", &[]).await.unwrap();
        let row = db.get_sync(id).await.unwrap();
        assert_eq!(row.status, SyncStatus::Pending);
        assert_eq!(row.remote_directory_url, "https://remote.example/directory");
    }

    #[tokio::test]
    async fn status_transitions_are_guarded() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example/directory", &[]).await.unwrap();

        // Illegal: PENDING -> IN_SYNC skips IN_PROGRESS.
        assert!(db.update_sync_status(id, SyncStatus::InSync).await.is_err());

        db.update_sync_status(id, SyncStatus::InProgress).await.unwrap();
        db.update_sync_status(id, SyncStatus::InSync).await.unwrap();

        // DELETED is unreachable directly from IN_SYNC.
        assert!(db.update_sync_status(id, SyncStatus::Deleted).await.is_err());

        db.update_sync_status(id, SyncStatus::DeletePending).await.unwrap();
        db.update_sync_status(id, SyncStatus::Deleted).await.unwrap();
    }

    #[tokio::test]
    async fn delete_sync_marks_delete_pending_not_deleted() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_sync("https://remote.example/directory", &[]).await.unwrap();
        db.update_sync_status(id, SyncStatus::InProgress).await.unwrap();
        db.delete_sync(id).await.unwrap();
        assert_eq!(db.get_sync(id).await.unwrap().status, SyncStatus::DeletePending);
    }

    #[tokio::test]
    async fn partial_sync_preserves_cid_list() {
        let db = Database::connect_in_memory().await.unwrap();
        let cids = vec![Cid::digest(b"one"), Cid::digest(b"two")];
        let id = db.create_sync("https://remote.example/directory", &cids).await.unwrap();
        let row = db.get_sync(id).await.unwrap();
        assert_eq!(row.cids, cids);
    }
}
