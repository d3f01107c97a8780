#[macro_use]
extern crate tracing;

mod planner;
mod service;
mod types;

pub use service::SearchService;
pub use types::{Query, QueryType, SearchRequest};
