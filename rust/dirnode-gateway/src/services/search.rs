//! `SearchService` wiring: the glob-aware query planner over the local
//! records index (spec.md §4.6), layered over [dirnode_search::SearchService].

use std::pin::Pin;
use std::sync::Arc;

use dirnode_authn::TrustDomainPolicy;
use dirnode_proto::dirnode::v1::search_service_server::SearchService as SearchServiceTrait;
use dirnode_proto::dirnode::v1::{
    Query as ProtoQuery, QueryType as ProtoQueryType, SearchRequest as ProtoSearchRequest,
    SearchResponse as ProtoSearchResponse,
};
use dirnode_search::{Query, QueryType, SearchRequest, SearchService};
use futures::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::convert::error_to_status;
use crate::interceptor::authorize;

pub struct SearchServiceImpl {
    search: Arc<SearchService>,
    policy: Option<Arc<TrustDomainPolicy>>,
}

impl SearchServiceImpl {
    pub fn new(search: Arc<SearchService>, policy: Option<Arc<TrustDomainPolicy>>) -> Self {
        SearchServiceImpl { search, policy }
    }
}

fn query_type_from_proto(kind: i32) -> Result<QueryType, Status> {
    Ok(match ProtoQueryType::try_from(kind).map_err(|_| Status::invalid_argument("unknown query type"))? {
        ProtoQueryType::Name => QueryType::Name,
        ProtoQueryType::Version => QueryType::Version,
        ProtoQueryType::SkillId => QueryType::SkillId,
        ProtoQueryType::SkillName => QueryType::SkillName,
        ProtoQueryType::Locator => QueryType::Locator,
        ProtoQueryType::Module => QueryType::Module,
        ProtoQueryType::Unspecified => {
            return Err(Status::invalid_argument("query type must be specified"))
        }
    })
}

fn query_from_proto(query: ProtoQuery) -> Result<Query, Status> {
    Ok(Query::new(query_type_from_proto(query.r#type)?, query.value))
}

type SearchStream = Pin<Box<dyn Stream<Item = Result<ProtoSearchResponse, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl SearchServiceTrait for SearchServiceImpl {
    type SearchStream = SearchStream;

    async fn search(&self, request: Request<ProtoSearchRequest>) -> Result<Response<Self::SearchStream>, Status> {
        authorize(self.policy.as_deref(), &request, "SearchService.Search")?;

        let request = request.into_inner();
        let queries = request
            .queries
            .into_iter()
            .map(query_from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        let search_request = SearchRequest {
            queries,
            limit: if request.limit == 0 { None } else { Some(request.limit) },
            offset: request.offset,
        };

        let stream = self.search.search(search_request).await.map_err(error_to_status)?;
        let stream = stream.map(|cid| Ok(ProtoSearchResponse { cid: cid.to_string() }));
        Ok(Response::new(Box::pin(stream)))
    }
}
