use dirnode_core::{Cid, Label, Result};

use crate::db::Database;
use crate::error::map_sqlx_error;

impl Database {
    /// Associates `label` with `cid`. Idempotent via `INSERT OR IGNORE`,
    /// matching Push's idempotence requirement for re-derived labels.
    pub async fn add_label(&self, label: &Label, cid: &Cid) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO labels (label, record_cid) VALUES (?, ?)")
            .bind(label.as_str())
            .bind(cid.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("add_label", error))?;
        Ok(())
    }

    pub async fn add_labels(&self, labels: &[Label], cid: &Cid) -> Result<()> {
        for label in labels {
            self.add_label(label, cid).await?;
        }
        Ok(())
    }

    pub async fn remove_label(&self, label: &Label, cid: &Cid) -> Result<()> {
        sqlx::query("DELETE FROM labels WHERE label = ? AND record_cid = ?")
            .bind(label.as_str())
            .bind(cid.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("remove_label", error))?;
        Ok(())
    }

    /// Removes every label row for `cid`, e.g. when a record is deleted.
    pub async fn remove_labels_for_record(&self, cid: &Cid) -> Result<()> {
        sqlx::query("DELETE FROM labels WHERE record_cid = ?")
            .bind(cid.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("remove_labels_for_record", error))?;
        Ok(())
    }

    /// Every label currently recorded for `cid`.
    pub async fn labels_for_record(&self, cid: &Cid) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT label FROM labels WHERE record_cid = ?")
            .bind(cid.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("labels_for_record", error))?;
        Ok(rows.into_iter().map(|(label,)| label).collect())
    }

    /// Every record CID carrying `label`, used by search/routing list
    /// operations to answer "who else advertises this label".
    pub async fn record_cids_for_label(&self, label: &Label) -> Result<Vec<Cid>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT record_cid FROM labels WHERE label = ?")
            .bind(label.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("record_cids_for_label", error))?;
        rows.into_iter().map(|(cid,)| cid.parse()).collect()
    }

    /// Count of distinct record CIDs carrying `label`, excluding `cid`
    /// itself — used to decide whether this node should keep advertising
    /// the label once a record is deleted locally but others still hold it.
    pub async fn count_other_records_for_label(&self, label: &Label, cid: &Cid) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM labels WHERE label = ? AND record_cid != ?",
        )
        .bind(label.as_str())
        .bind(cid.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("count_other_records_for_label", error))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirnode_core::Label;

    #[tokio::test]
    async fn add_and_list_labels() {
        let db = Database::connect_in_memory().await.unwrap();
        let cid = Cid::digest(b"agent-x");
        let label = Label::new("names", "agent-x");
        db.add_label(&label, &cid).await.unwrap();

        let labels = db.labels_for_record(&cid).await.unwrap();
        assert_eq!(labels, vec!["/names/agent-x".to_string()]);
    }

    #[tokio::test]
    async fn add_label_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let cid = Cid::digest(b"agent-x");
        let label = Label::new("names", "agent-x");
        db.add_label(&label, &cid).await.unwrap();
        db.add_label(&label, &cid).await.unwrap();
        assert_eq!(db.labels_for_record(&cid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn count_other_records_excludes_self() {
        let db = Database::connect_in_memory().await.unwrap();
        let label = Label::new("skills", "forecast");
        let cid_a = Cid::digest(b"a");
        let cid_b = Cid::digest(b"b");
        db.add_label(&label, &cid_a).await.unwrap();
        db.add_label(&label, &cid_b).await.unwrap();

        assert_eq!(
            db.count_other_records_for_label(&label, &cid_a)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn remove_labels_for_record_clears_all() {
        let db = Database::connect_in_memory().await.unwrap();
        let cid = Cid::digest(b"agent-x");
        db.add_label(&Label::new("names", "agent-x"), &cid)
            .await
            .unwrap();
        db.add_label(&Label::new("skills", "forecast"), &cid)
            .await
            .unwrap();

        db.remove_labels_for_record(&cid).await.unwrap();
        assert!(db.labels_for_record(&cid).await.unwrap().is_empty());
    }
}
