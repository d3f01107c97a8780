use dirnode_core::{Cid, Result};
use dirnode_db::Database;
use tokio_stream::Stream;

use crate::planner::Plan;
use crate::types::SearchRequest;

/// Executes Search requests against the records index (spec.md §4.6).
#[derive(Clone)]
pub struct SearchService {
    db: Database,
}

impl SearchService {
    pub fn new(db: Database) -> Self {
        SearchService { db }
    }

    /// Streams matching CIDs. `limit` bounds total emission; `offset` skips
    /// from the head of the (CID-ordered) result set.
    pub async fn search(&self, request: SearchRequest) -> Result<impl Stream<Item = Cid>> {
        let plan = Plan::compile(&request.queries)?;
        let rows = self.db.all_record_index().await?;

        let matched: Vec<Cid> = rows
            .into_iter()
            .filter(|row| plan.matches(row))
            .skip(request.offset as usize)
            .map(|row| row.cid)
            .collect();

        let limit = request.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        let matched: Vec<Cid> = matched.into_iter().take(limit).collect();
        debug!("search matched {} record(s)", matched.len());

        Ok(async_stream::stream! {
            for cid in matched {
                yield cid;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Query, QueryType};
    use dirnode_core::{Locator, Record, Skill};
    use std::collections::BTreeMap;
    use tokio_stream::StreamExt;

    fn record(name: &str, skill_name: &str) -> Record {
        Record {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            authors: vec![],
            created_at: chrono::Utc::now(),
            skills: vec![Skill {
                id: format!("{name}-skill"),
                name: skill_name.to_string(),
                annotations: BTreeMap::new(),
            }],
            locators: vec![Locator {
                kind: "grpc".to_string(),
                url: format!("grpc://{name}.example:443"),
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
    async fn search_filters_by_name_glob() {
        let db = Database::connect_in_memory().await.unwrap();
        let weather = Cid::digest(b"weather");
        let billing = Cid::digest(b"billing");
        db.upsert_record_index(&weather, &record("weather-agent", "forecast")).await.unwrap();
        db.upsert_record_index(&billing, &record("billing-agent", "invoicing")).await.unwrap();

        let service = SearchService::new(db);
        let request = SearchRequest {
            queries: vec![Query::new(QueryType::Name, "weather-*")],
            limit: None,
            offset: 0,
        };
        let results: Vec<Cid> = service.search(request).await.unwrap().collect().await;
        assert_eq!(results, vec![weather]);
    }

    #[tokio::test]
    async fn search_honors_limit_and_offset() {
        let db = Database::connect_in_memory().await.unwrap();
        for index in 0..5 {
            let name = format!("agent-{index}");
            let cid = Cid::digest(name.as_bytes());
            db.upsert_record_index(&cid, &record(&name, "forecast")).await.unwrap();
        }

        let service = SearchService::new(db);
        let request = SearchRequest {
            queries: vec![Query::new(QueryType::SkillName, "forecast")],
            limit: Some(2),
            offset: 1,
        };
        let results: Vec<Cid> = service.search(request).await.unwrap().collect().await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn search_ands_across_query_types() {
        let db = Database::connect_in_memory().await.unwrap();
        let weather = Cid::digest(b"weather");
        db.upsert_record_index(&weather, &record("weather-agent", "forecast")).await.unwrap();

        let service = SearchService::new(db);
        let request = SearchRequest {
            queries: vec![
                Query::new(QueryType::Name, "weather-*"),
                Query::new(QueryType::SkillName, "translation"),
            ],
            limit: None,
            offset: 0,
        };
        let results: Vec<Cid> = service.search(request).await.unwrap().collect().await;
        assert!(results.is_empty());
    }
}
