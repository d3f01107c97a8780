use chrono::{DateTime, Utc};
use dirnode_core::{Cid, Error, Record, Result};

use crate::db::Database;
use crate::error::map_sqlx_error;

/// The denormalized projection of a [Record] used to answer Search queries
/// without re-parsing the canonical record body (spec.md §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIndexRow {
    pub cid: Cid,
    pub name: String,
    pub version: String,
    pub skills: Vec<String>,
    pub skill_ids: Vec<String>,
    pub locators: Vec<String>,
    pub modules: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RecordIndexRecord {
    cid: String,
    name: String,
    version: String,
    skills: String,
    skill_ids: String,
    locators: String,
    modules: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordIndexRecord> for RecordIndexRow {
    type Error = Error;

    fn try_from(row: RecordIndexRecord) -> Result<Self> {
        Ok(RecordIndexRow {
            cid: row.cid.parse()?,
            name: row.name,
            version: row.version,
            skills: serde_json::from_str(&row.skills)?,
            skill_ids: serde_json::from_str(&row.skill_ids)?,
            locators: serde_json::from_str(&row.locators)?,
            modules: serde_json::from_str(&row.modules)?,
            created_at: row.created_at,
        })
    }
}

impl Database {
    /// Inserts or replaces the index row for `record`'s CID. Idempotent:
    /// re-indexing an already-pushed record (spec.md §4.1 Push idempotence)
    /// is a no-op in substance even if it re-touches `created_at`.
    pub async fn upsert_record_index(&self, cid: &Cid, record: &Record) -> Result<()> {
        let skills: Vec<String> = record.skills.iter().map(|s| s.name.clone()).collect();
        let skill_ids: Vec<String> = record
            .skills
            .iter()
            .filter(|s| !s.id.is_empty())
            .map(|s| s.id.clone())
            .collect();
        let locators: Vec<String> = record.locators.iter().map(|l| l.kind.clone()).collect();
        let modules: Vec<String> = record.extensions.iter().map(|e| e.name.clone()).collect();

        sqlx::query(
            "INSERT INTO records_index (cid, name, version, skills, skill_ids, locators, modules, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(cid) DO UPDATE SET
                name = excluded.name,
                version = excluded.version,
                skills = excluded.skills,
                skill_ids = excluded.skill_ids,
                locators = excluded.locators,
                modules = excluded.modules",
        )
        .bind(cid.to_string())
        .bind(&record.name)
        .bind(&record.version)
        .bind(serde_json::to_string(&skills)?)
        .bind(serde_json::to_string(&skill_ids)?)
        .bind(serde_json::to_string(&locators)?)
        .bind(serde_json::to_string(&modules)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("upsert_record_index", error))?;

        Ok(())
    }

    pub async fn get_record_index(&self, cid: &Cid) -> Result<RecordIndexRow> {
        let record: Option<RecordIndexRecord> = sqlx::query_as(
            "SELECT cid, name, version, skills, skill_ids, locators, modules, created_at
             FROM records_index WHERE cid = ?",
        )
        .bind(cid.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("get_record_index", error))?;

        record
            .ok_or_else(|| Error::NotFound(format!("record index for {cid}")))?
            .try_into()
    }

    pub async fn delete_record_index(&self, cid: &Cid) -> Result<()> {
        sqlx::query("DELETE FROM records_index WHERE cid = ?")
            .bind(cid.to_string())
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error("delete_record_index", error))?;
        Ok(())
    }

    /// Every indexed record, ordered by CID. Backs Search's in-memory glob
    /// filtering over the multi-valued `skills`/`locators`/`modules`
    /// projections (spec.md §4.6).
    pub async fn all_record_index(&self) -> Result<Vec<RecordIndexRow>> {
        let records: Vec<RecordIndexRecord> = sqlx::query_as(
            "SELECT cid, name, version, skills, skill_ids, locators, modules, created_at
             FROM records_index ORDER BY cid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error("all_record_index", error))?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirnode_core::{Locator, Skill};

    fn sample_record() -> Record {
        use std::collections::BTreeMap;

        Record {
            name: "weather-agent".to_string(),
            version: "1.0.0".to_string(),
            description: Some("fetches weather forecasts".to_string()),
            authors: vec!["team-weather".to_string()],
            created_at: Utc::now(),
            skills: vec![Skill {
                id: "skill-1".to_string(),
                name: "forecast".to_string(),
                annotations: BTreeMap::new(),
            }],
            locators: vec![Locator {
                kind: "grpc".to_string(),
                url: "grpc://weather.example:443".to_string(),
                size: None,
                digest: None,
                annotations: BTreeMap::new(),
            }],
            extensions: vec![],
            signature: None,
            tags: vec![],
            previous_record_cid: None,
            annotations: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_fetch() {
        let db = Database::connect_in_memory().await.unwrap();
        let record = sample_record();
        let cid = Cid::digest(b"weather-agent-v1");
        db.upsert_record_index(&cid, &record).await.unwrap();

        let row = db.get_record_index(&cid).await.unwrap();
        assert_eq!(row.name, "weather-agent");
        assert_eq!(row.skills, vec!["forecast".to_string()]);
        assert_eq!(row.skill_ids, vec!["skill-1".to_string()]);
        assert_eq!(row.locators, vec!["grpc".to_string()]);
    }

    #[tokio::test]
    async fn all_record_index_returns_every_row_ordered_by_cid() {
        let db = Database::connect_in_memory().await.unwrap();
        let record = sample_record();
        let cid_a = Cid::digest(b"weather-agent-a");
        let cid_b = Cid::digest(b"weather-agent-b");
        db.upsert_record_index(&cid_a, &record).await.unwrap();
        db.upsert_record_index(&cid_b, &record).await.unwrap();

        let rows = db.all_record_index().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].cid <= rows[1].cid);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let record = sample_record();
        let cid = Cid::digest(b"weather-agent-v1");
        db.upsert_record_index(&cid, &record).await.unwrap();
        db.upsert_record_index(&cid, &record).await.unwrap();
        let row = db.get_record_index(&cid).await.unwrap();
        assert_eq!(row.name, "weather-agent");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let db = Database::connect_in_memory().await.unwrap();
        let record = sample_record();
        let cid = Cid::digest(b"weather-agent-v1");
        db.upsert_record_index(&cid, &record).await.unwrap();
        db.delete_record_index(&cid).await.unwrap();
        assert!(db.get_record_index(&cid).await.is_err());
    }
}
