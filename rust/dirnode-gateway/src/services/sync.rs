//! `SyncService` wiring: federation CRUD over sync rows (spec.md §4.3) and
//! the credential handshake a remote directory uses to mirror this node's
//! registry (spec.md §4.5 step 1).

use std::pin::Pin;
use std::sync::Arc;

use dirnode_authn::TrustDomainPolicy;
use dirnode_core::Cid;
use dirnode_db::Database;
use dirnode_proto::dirnode::v1::sync_service_server::SyncService as SyncServiceTrait;
use dirnode_proto::dirnode::v1::{
    CreateSyncRequest, CreateSyncResponse, DeleteSyncRequest, DeleteSyncResponse, GetSyncRequest, GetSyncResponse,
    ListSyncsRequest, ListSyncsResponse, RequestRegistryCredentialsRequest, RequestRegistryCredentialsResponse,
    SyncSummary,
};
use futures::Stream;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::convert::error_to_status;
use crate::interceptor::authorize;

/// Static federation credentials this node hands out to requesting peers
/// (spec.md §4.5 step 1). A deployment typically scopes these to a
/// read-only registry account.
#[derive(Clone)]
pub struct FederationCredentials {
    pub remote_registry_url: String,
    pub username: String,
    pub password: String,
}

pub struct SyncServiceImpl {
    db: Database,
    credentials: FederationCredentials,
    policy: Option<Arc<TrustDomainPolicy>>,
}

impl SyncServiceImpl {
    pub fn new(db: Database, credentials: FederationCredentials, policy: Option<Arc<TrustDomainPolicy>>) -> Self {
        SyncServiceImpl { db, credentials, policy }
    }

    fn check<T>(&self, request: &Request<T>, method: &str) -> Result<(), Status> {
        authorize(self.policy.as_deref(), request, method)
    }
}

fn parse_sync_id(raw: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw).map_err(|error| Status::invalid_argument(format!("malformed sync_id: {error}")))
}

type ListSyncsStream = Pin<Box<dyn Stream<Item = Result<ListSyncsResponse, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl SyncServiceTrait for SyncServiceImpl {
    async fn create_sync(&self, request: Request<CreateSyncRequest>) -> Result<Response<CreateSyncResponse>, Status> {
        self.check(&request, "SyncService.CreateSync")?;

        let request = request.into_inner();
        let cids: Vec<Cid> = request
            .cids
            .iter()
            .map(|value| value.parse().map_err(error_to_status))
            .collect::<Result<_, _>>()?;

        let id = self
            .db
            .create_sync(&request.remote_directory_url, &cids)
            .await
            .map_err(error_to_status)?;
        Ok(Response::new(CreateSyncResponse { sync_id: id.to_string() }))
    }

    type ListSyncsStream = ListSyncsStream;

    async fn list_syncs(
        &self,
        request: Request<ListSyncsRequest>,
    ) -> Result<Response<Self::ListSyncsStream>, Status> {
        self.check(&request, "SyncService.ListSyncs")?;

        let request = request.into_inner();
        let limit = if request.limit == 0 { 100 } else { request.limit as i64 };
        let rows = self
            .db
            .list_syncs(limit, request.offset as i64)
            .await
            .map_err(error_to_status)?;

        let stream = async_stream::stream! {
            for row in rows {
                yield Ok(ListSyncsResponse {
                    sync: Some(SyncSummary {
                        sync_id: row.id.to_string(),
                        remote_directory_url: row.remote_directory_url,
                        status: row.status.to_string(),
                    }),
                });
            }
        };
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_sync(&self, request: Request<GetSyncRequest>) -> Result<Response<GetSyncResponse>, Status> {
        self.check(&request, "SyncService.GetSync")?;

        let id = parse_sync_id(&request.into_inner().sync_id)?;
        let row = self.db.get_sync(id).await.map_err(error_to_status)?;
        Ok(Response::new(GetSyncResponse {
            sync_id: row.id.to_string(),
            remote_directory_url: row.remote_directory_url,
            remote_registry_url: row.remote_registry_url,
            status: row.status.to_string(),
            cids: row.cids.iter().map(Cid::to_string).collect(),
        }))
    }

    async fn delete_sync(&self, request: Request<DeleteSyncRequest>) -> Result<Response<DeleteSyncResponse>, Status> {
        self.check(&request, "SyncService.DeleteSync")?;

        let id = parse_sync_id(&request.into_inner().sync_id)?;
        self.db.delete_sync(id).await.map_err(error_to_status)?;
        Ok(Response::new(DeleteSyncResponse {}))
    }

    async fn request_registry_credentials(
        &self,
        request: Request<RequestRegistryCredentialsRequest>,
    ) -> Result<Response<RequestRegistryCredentialsResponse>, Status> {
        self.check(&request, "SyncService.RequestRegistryCredentials")?;

        let requesting_node_id = request.into_inner().requesting_node_id;
        info!("issuing federation credentials to {requesting_node_id}");

        Ok(Response::new(RequestRegistryCredentialsResponse {
            remote_registry_url: self.credentials.remote_registry_url.clone(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        }))
    }
}
