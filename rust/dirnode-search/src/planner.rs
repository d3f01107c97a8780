use dirnode_core::{Error, Result};
use dirnode_db::RecordIndexRow;
use globset::{Glob, GlobMatcher};

use crate::types::{Query, QueryType};

/// A compiled query ready to test against a [RecordIndexRow].
pub struct CompiledQuery {
    kind: QueryType,
    matcher: GlobMatcher,
}

impl CompiledQuery {
    fn compile(query: &Query) -> Result<Self> {
        let glob = Glob::new(&query.value)
            .map_err(|error| Error::InvalidArgument(format!("invalid search pattern {:?}: {error}", query.value)))?;
        Ok(CompiledQuery { kind: query.kind, matcher: glob.compile_matcher() })
    }

    fn matches_row(&self, row: &RecordIndexRow) -> bool {
        match self.kind {
            QueryType::Name => self.matcher.is_match(&row.name),
            QueryType::Version => self.matcher.is_match(&row.version),
            QueryType::SkillId => row.skill_ids.iter().any(|value| self.matcher.is_match(value)),
            QueryType::SkillName => row.skills.iter().any(|value| self.matcher.is_match(value)),
            QueryType::Locator => row.locators.iter().any(|value| self.matcher.is_match(value)),
            QueryType::Module => row.modules.iter().any(|value| self.matcher.is_match(value)),
        }
    }
}

/// Compiles `queries` and groups them by [QueryType] so that matching can OR
/// within a type and AND across types (spec.md §4.6).
pub struct Plan {
    groups: Vec<Vec<CompiledQuery>>,
}

impl Plan {
    pub fn compile(queries: &[Query]) -> Result<Self> {
        let mut groups: Vec<Vec<CompiledQuery>> = Vec::new();
        for kind in [
            QueryType::Name,
            QueryType::Version,
            QueryType::SkillId,
            QueryType::SkillName,
            QueryType::Locator,
            QueryType::Module,
        ] {
            let compiled: Vec<CompiledQuery> = queries
                .iter()
                .filter(|query| query.kind == kind)
                .map(CompiledQuery::compile)
                .collect::<Result<Vec<_>>>()?;
            if !compiled.is_empty() {
                groups.push(compiled);
            }
        }
        Ok(Plan { groups })
    }

    /// True if `row` satisfies every query-type group (AND across types, OR
    /// within a type). An empty plan matches everything.
    pub fn matches(&self, row: &RecordIndexRow) -> bool {
        self.groups
            .iter()
            .all(|group| group.iter().any(|query| query.matches_row(row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dirnode_core::Cid;

    fn row(name: &str, skills: &[&str]) -> RecordIndexRow {
        RecordIndexRow {
            cid: Cid::digest(name.as_bytes()),
            name: name.to_string(),
            version: "1.0.0".to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            skill_ids: vec![],
            locators: vec![],
            modules: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_plan_matches_everything() {
        let plan = Plan::compile(&[]).unwrap();
        assert!(plan.matches(&row("agent-x", &[])));
    }

    #[test]
    fn same_type_queries_or_together() {
        let queries = vec![
            Query::new(QueryType::Name, "weather-*"),
            Query::new(QueryType::Name, "traffic-*"),
        ];
        let plan = Plan::compile(&queries).unwrap();
        assert!(plan.matches(&row("weather-agent", &[])));
        assert!(plan.matches(&row("traffic-agent", &[])));
        assert!(!plan.matches(&row("billing-agent", &[])));
    }

    #[test]
    fn different_types_and_together() {
        let queries = vec![
            Query::new(QueryType::Name, "weather-*"),
            Query::new(QueryType::SkillName, "forecast"),
        ];
        let plan = Plan::compile(&queries).unwrap();
        assert!(plan.matches(&row("weather-agent", &["forecast"])));
        assert!(!plan.matches(&row("weather-agent", &["translation"])));
        assert!(!plan.matches(&row("billing-agent", &["forecast"])));
    }

    #[test]
    fn charset_globs_are_supported() {
        let queries = vec![Query::new(QueryType::Name, "agent-[xy]")];
        let plan = Plan::compile(&queries).unwrap();
        assert!(plan.matches(&row("agent-x", &[])));
        assert!(!plan.matches(&row("agent-z", &[])));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let queries = vec![Query::new(QueryType::Name, "agent-[")];
        assert!(Plan::compile(&queries).is_err());
    }
}
