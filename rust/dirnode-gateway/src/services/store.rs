//! `StoreService` wiring: push/pull/lookup/delete over immutable,
//! content-addressed agent records (spec.md §4.1-§4.4), layered over
//! [dirnode_store::StoreApi].

use std::pin::Pin;
use std::sync::Arc;

use dirnode_authn::TrustDomainPolicy;
use dirnode_core::Record;
use dirnode_proto::dirnode::v1::store_service_server::StoreService as StoreServiceTrait;
use dirnode_proto::dirnode::v1::{
    DeleteRequest, DeleteResponse, LookupRequest, LookupResponse, PullReferrerRequest, PullReferrerResponse,
    PullRequest, PullResponse, PushReferrerRequest, PushReferrerResponse, PushRequest, PushResponse, ReferrerKind,
};
use dirnode_store::{Referrer, ReferrerKind as CoreReferrerKind, StoreApi};
use futures::Stream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status, Streaming};

use crate::convert::{error_to_status, parse_cid};
use crate::interceptor::authorize;

pub struct StoreServiceImpl {
    store: Arc<dyn StoreApi>,
    policy: Option<Arc<TrustDomainPolicy>>,
}

impl StoreServiceImpl {
    pub fn new(store: Arc<dyn StoreApi>, policy: Option<Arc<TrustDomainPolicy>>) -> Self {
        StoreServiceImpl { store, policy }
    }

    fn check<T>(&self, request: &Request<T>, method: &str) -> Result<(), Status> {
        authorize(self.policy.as_deref(), request, method)
    }
}

fn referrer_kind_from_proto(kind: i32) -> CoreReferrerKind {
    match ReferrerKind::try_from(kind).unwrap_or(ReferrerKind::Unspecified) {
        ReferrerKind::PublicKey => CoreReferrerKind::PublicKey,
        _ => CoreReferrerKind::Signature,
    }
}

type ByteStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl StoreServiceTrait for StoreServiceImpl {
    async fn push(&self, request: Request<Streaming<PushRequest>>) -> Result<Response<PushResponse>, Status> {
        self.check(&request, "StoreService.Push")?;

        let mut stream = request.into_inner();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?.record_chunk);
        }

        let record: Record = serde_json::from_slice(&bytes)
            .map_err(|error| Status::invalid_argument(format!("malformed record payload: {error}")))?;
        let cid = self.store.push(&record).await.map_err(error_to_status)?;
        Ok(Response::new(PushResponse { cid: cid.to_string() }))
    }

    async fn push_referrer(
        &self,
        request: Request<Streaming<PushReferrerRequest>>,
    ) -> Result<Response<PushReferrerResponse>, Status> {
        self.check(&request, "StoreService.PushReferrer")?;

        let mut stream = request.into_inner();
        let mut subject_cid = None;
        let mut kind = ReferrerKind::Unspecified as i32;
        let mut media_type = String::new();
        let mut body = Vec::new();

        while let Some(message) = stream.next().await {
            let message = message?;
            if subject_cid.is_none() {
                subject_cid = Some(message.subject_cid);
                kind = message.kind;
                media_type = message.media_type;
            }
            body.extend_from_slice(&message.body_chunk);
        }

        let subject_cid = subject_cid.ok_or_else(|| Status::invalid_argument("empty PushReferrer stream"))?;
        let subject = parse_cid(&subject_cid)?;

        let digest = self
            .store
            .push_referrer(
                &subject,
                Referrer { kind: referrer_kind_from_proto(kind), media_type, body },
            )
            .await
            .map_err(error_to_status)?;

        Ok(Response::new(PushReferrerResponse { ref_digest: digest }))
    }

    type PullStream = ByteStream<PullResponse>;

    async fn pull(&self, request: Request<PullRequest>) -> Result<Response<Self::PullStream>, Status> {
        self.check(&request, "StoreService.Pull")?;

        let cid = parse_cid(&request.into_inner().cid)?;
        let record = self.store.pull(&cid).await.map_err(error_to_status)?;
        let bytes = serde_json::to_vec(&record).map_err(|error| Status::internal(error.to_string()))?;

        let stream = async_stream::stream! {
            yield Ok(PullResponse { record_chunk: bytes });
        };
        Ok(Response::new(Box::pin(stream)))
    }

    type PullReferrerStream = ByteStream<PullReferrerResponse>;

    async fn pull_referrer(
        &self,
        request: Request<PullReferrerRequest>,
    ) -> Result<Response<Self::PullReferrerStream>, Status> {
        self.check(&request, "StoreService.PullReferrer")?;

        let request = request.into_inner();
        let subject = parse_cid(&request.subject_cid)?;
        let kind = referrer_kind_from_proto(request.kind);
        let referrer = self.store.pull_referrer(&subject, kind).await.map_err(error_to_status)?;

        let stream = async_stream::stream! {
            yield Ok(PullReferrerResponse { body_chunk: referrer.body });
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn lookup(&self, request: Request<LookupRequest>) -> Result<Response<LookupResponse>, Status> {
        self.check(&request, "StoreService.Lookup")?;

        let cid = parse_cid(&request.into_inner().cid)?;
        let metadata = self.store.lookup(&cid).await.map_err(error_to_status)?;
        Ok(Response::new(LookupResponse {
            cid: metadata.cid.to_string(),
            name: metadata.name,
            version: metadata.version,
            size_bytes: metadata.size,
        }))
    }

    async fn delete(&self, request: Request<DeleteRequest>) -> Result<Response<DeleteResponse>, Status> {
        self.check(&request, "StoreService.Delete")?;

        let cid = parse_cid(&request.into_inner().cid)?;
        self.store.delete(&cid).await.map_err(error_to_status)?;
        Ok(Response::new(DeleteResponse {}))
    }
}
