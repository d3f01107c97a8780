//! `RoutingService` wiring: publish/discover over the libp2p Kademlia DHT
//! and gossipsub announce topic (spec.md §4.4), layered over
//! [dirnode_routing::RoutingNode].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dirnode_authn::TrustDomainPolicy;
use dirnode_core::{Cid, Label};
use dirnode_db::Database;
use dirnode_proto::dirnode::v1::routing_service_server::RoutingService as RoutingServiceTrait;
use dirnode_proto::dirnode::v1::{
    ListRequest, ListResponse, ListScope as ProtoListScope, PublishRequest, PublishResponse,
    RoutingSearchRequest, RoutingSearchResponse, UnpublishRequest, UnpublishResponse,
};
use dirnode_routing::{LabelFilter, ListScope, RoutingNode};
use futures::{Stream, StreamExt};
use libp2p::PeerId;
use tonic::{Request, Response, Status};

use crate::convert::error_to_status;
use crate::interceptor::authorize;

const DEFAULT_SEARCH_DEADLINE: Duration = Duration::from_secs(5);

pub struct RoutingServiceImpl {
    node: Arc<RoutingNode>,
    db: Database,
    policy: Option<Arc<TrustDomainPolicy>>,
}

impl RoutingServiceImpl {
    pub fn new(node: Arc<RoutingNode>, db: Database, policy: Option<Arc<TrustDomainPolicy>>) -> Self {
        RoutingServiceImpl { node, db, policy }
    }

    fn check<T>(&self, request: &Request<T>, method: &str) -> Result<(), Status> {
        authorize(self.policy.as_deref(), request, method)
    }
}

fn parse_labels(values: &[String]) -> Result<Vec<Label>, Status> {
    values
        .iter()
        .map(|value| value.parse().map_err(error_to_status))
        .collect()
}

type ListStream = Pin<Box<dyn Stream<Item = Result<ListResponse, Status>> + Send + 'static>>;
type RoutingSearchStream = Pin<Box<dyn Stream<Item = Result<RoutingSearchResponse, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl RoutingServiceTrait for RoutingServiceImpl {
    async fn publish(&self, request: Request<PublishRequest>) -> Result<Response<PublishResponse>, Status> {
        self.check(&request, "RoutingService.Publish")?;

        let request = request.into_inner();
        let cid: Cid = request.cid.parse().map_err(error_to_status)?;
        let labels = parse_labels(&request.labels)?;

        self.db.add_labels(&labels, &cid).await.map_err(error_to_status)?;
        self.node.publish(cid, labels).await.map_err(error_to_status)?;
        Ok(Response::new(PublishResponse {}))
    }

    async fn unpublish(&self, request: Request<UnpublishRequest>) -> Result<Response<UnpublishResponse>, Status> {
        self.check(&request, "RoutingService.Unpublish")?;

        let cid: Cid = request.into_inner().cid.parse().map_err(error_to_status)?;
        let labels = parse_labels(&self.db.labels_for_record(&cid).await.map_err(error_to_status)?)?;

        let mut orphaned = Vec::new();
        for label in &labels {
            let remaining = self
                .db
                .count_other_records_for_label(label, &cid)
                .await
                .map_err(error_to_status)?;
            if remaining == 0 {
                orphaned.push(label.clone());
            }
        }

        self.db.remove_labels_for_record(&cid).await.map_err(error_to_status)?;
        self.node.unpublish(cid, orphaned).await.map_err(error_to_status)?;
        Ok(Response::new(UnpublishResponse {}))
    }

    type ListStream = ListStream;

    async fn list(&self, request: Request<ListRequest>) -> Result<Response<Self::ListStream>, Status> {
        self.check(&request, "RoutingService.List")?;

        let request = request.into_inner();
        let labels = parse_labels(&request.labels)?;
        let scope = match ProtoListScope::try_from(request.scope).unwrap_or(ProtoListScope::Local) {
            ProtoListScope::Peer => {
                let peer_id = request
                    .peer_id
                    .as_deref()
                    .ok_or_else(|| Status::invalid_argument("scope LIST_SCOPE_PEER requires peer_id"))?;
                let peer: PeerId = peer_id
                    .parse()
                    .map_err(|error| Status::invalid_argument(format!("malformed peer_id: {error}")))?;
                ListScope::Peer(peer)
            }
            ProtoListScope::Network => ListScope::Network,
            _ => ListScope::Local,
        };

        let results = self
            .node
            .list(LabelFilter { labels, scope })
            .await
            .map_err(error_to_status)?;

        let stream = results.map(|entry| {
            Ok(ListResponse {
                peer_id: entry.peer.to_string(),
                label_counts: entry.label_counts.into_iter().collect(),
            })
        });
        Ok(Response::new(Box::pin(stream)))
    }

    type SearchStream = RoutingSearchStream;

    async fn search(
        &self,
        request: Request<RoutingSearchRequest>,
    ) -> Result<Response<Self::SearchStream>, Status> {
        self.check(&request, "RoutingService.Search")?;

        let request = request.into_inner();
        let labels = parse_labels(&request.labels)?;
        let deadline = request
            .deadline_millis
            .map(|millis| Duration::from_millis(millis.max(0) as u64))
            .unwrap_or(DEFAULT_SEARCH_DEADLINE);

        let mut known: HashMap<Label, Cid> = HashMap::new();
        for label in &labels {
            if let Ok(cids) = self.db.record_cids_for_label(label).await {
                if let Some(cid) = cids.into_iter().next() {
                    known.insert(label.clone(), cid);
                }
            }
        }

        let results = self
            .node
            .search(labels, move |label, _peer| known.get(label).cloned(), deadline)
            .await
            .map_err(error_to_status)?;

        let stream = results.map(|hit| {
            Ok(RoutingSearchResponse { peer_id: hit.peer.to_string(), cid: hit.cid.to_string() })
        });
        Ok(Response::new(Box::pin(stream)))
    }
}
