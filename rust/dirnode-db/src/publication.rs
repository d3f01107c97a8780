use chrono::{DateTime, Utc};
use dirnode_core::{Cid, Error, Result};
use uuid::Uuid;

use crate::db::Database;
use crate::error::map_sqlx_error;
use crate::status::PublicationStatus;

/// Tracks a local Push that still needs to be announced on the routing
/// plane (spec.md §4.4). One row per batch of CIDs pushed in a single
/// request.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRow {
    pub id: Uuid,
    pub record_cids: Vec<Cid>,
    pub status: PublicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PublicationRecord {
    id: String,
    record_cids: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PublicationRecord> for PublicationRow {
    type Error = Error;

    fn try_from(row: PublicationRecord) -> Result<Self> {
        let cids: Vec<String> = serde_json::from_str(&row.record_cids)?;
        let record_cids = cids
            .into_iter()
            .map(|c| c.parse())
            .collect::<Result<Vec<Cid>>>()?;
        Ok(PublicationRow {
            id: Uuid::parse_str(&row.id).map_err(|error| {
                Error::Internal(anyhow::anyhow!("malformed publication id: {error}"))
            })?,
            record_cids,
            status: row
                .status
                .parse()
                .map_err(|_| Error::Internal(anyhow::anyhow!("malformed publication status")))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Database {
    pub async fn create_publication(&self, record_cids: &[Cid]) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let cids_json =
            serde_json::to_string(&record_cids.iter().map(Cid::to_string).collect::<Vec<_>>())?;

        sqlx::query(
            "INSERT INTO publications (id, record_cids, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(cids_json)
        .bind(PublicationStatus::Pending.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("create_publication", error))?;

        Ok(id)
    }

    pub async fn get_publication(&self, id: Uuid) -> Result<PublicationRow> {
        let record: Option<PublicationRecord> = sqlx::query_as(
            "SELECT id, record_cids, status, created_at, updated_at FROM publications WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("get_publication", error))?;

        record
            .ok_or_else(|| Error::NotFound(format!("publication {id}")))?
            .try_into()
    }

    pub async fn get_publications_by_status(
        &self,
        status: PublicationStatus,
    ) -> Result<Vec<PublicationRow>> {
        let records: Vec<PublicationRecord> = sqlx::query_as(
            "SELECT id, record_cids, status, created_at, updated_at
             FROM publications WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("get_publications_by_status", error))?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn update_publication_status(&self, id: Uuid, to: PublicationStatus) -> Result<()> {
        let current = self.get_publication(id).await?.status;
        if !current.can_transition_to(to) {
            return Err(Error::FailedPrecondition(format!(
                "publication {id} cannot transition from {current} to {to}"
            )));
        }

        let result = sqlx::query(
            "UPDATE publications SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.to_string())
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(current.to_string())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("update_publication_status", error))?;

        if result.rows_affected() == 0 {
            return Err(Error::FailedPrecondition(format!(
                "publication {id} status changed concurrently; retry"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let db = Database::connect_in_memory().await.unwrap();
        let cids = vec![Cid::digest(b"a"), Cid::digest(b"b")];
        let id = db.create_publication(&cids).await.unwrap();
        let row = db.get_publication(id).await.unwrap();
        assert_eq!(row.record_cids, cids);
        assert_eq!(row.status, PublicationStatus::Pending);
    }

    #[tokio::test]
    async fn status_transitions_are_guarded() {
        let db = Database::connect_in_memory().await.unwrap();
        let id = db.create_publication(&[]).await.unwrap();

        assert!(db
            .update_publication_status(id, PublicationStatus::Published)
            .await
            .is_err());

        db.update_publication_status(id, PublicationStatus::InProgress)
            .await
            .unwrap();
        db.update_publication_status(id, PublicationStatus::Published)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_publications_by_status_filters() {
        let db = Database::connect_in_memory().await.unwrap();
        let pending = db.create_publication(&[]).await.unwrap();
        let other = db.create_publication(&[]).await.unwrap();
        db.update_publication_status(other, PublicationStatus::InProgress)
            .await
            .unwrap();

        let rows = db
            .get_publications_by_status(PublicationStatus::Pending)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, pending);
    }
}
