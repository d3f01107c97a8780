use serde::{Deserialize, Serialize};

/// The dimension a [Query] matches against (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Name,
    Version,
    SkillId,
    SkillName,
    Locator,
    Module,
}

/// One glob-capable match against a single dimension. `value` may contain
/// `*`, `?`, and `[charset]` wildcards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    #[serde(rename = "type")]
    pub kind: QueryType,
    pub value: String,
}

impl Query {
    pub fn new(kind: QueryType, value: impl Into<String>) -> Self {
        Query { kind, value: value.into() }
    }
}

/// A Search request: queries of the same [QueryType] OR together, distinct
/// types AND together (spec.md §4.6).
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub queries: Vec<Query>,
    pub limit: Option<u32>,
    pub offset: u32,
}
