//! The gateway's implementation of [dirnode_sync::RemoteDirectoryClient]: a
//! `tonic` channel dialing a remote directory's `SyncService` (spec.md §6).

use async_trait::async_trait;
use dirnode_core::{Error, Result};
use dirnode_proto::dirnode::v1::sync_service_client::SyncServiceClient;
use dirnode_proto::dirnode::v1::RequestRegistryCredentialsRequest;
use dirnode_sync::{BasicAuth, RegistryCredentials, RemoteDirectoryClient};

pub struct GrpcRemoteDirectoryClient;

impl GrpcRemoteDirectoryClient {
    pub fn new() -> Self {
        GrpcRemoteDirectoryClient
    }
}

impl Default for GrpcRemoteDirectoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDirectoryClient for GrpcRemoteDirectoryClient {
    async fn request_registry_credentials(
        &self,
        remote_directory_url: &str,
        requesting_node_id: &str,
    ) -> Result<RegistryCredentials> {
        let mut client = SyncServiceClient::connect(remote_directory_url.to_string())
            .await
            .map_err(|error| Error::Unavailable(format!("dialing {remote_directory_url}: {error}")))?;

        let response = client
            .request_registry_credentials(RequestRegistryCredentialsRequest {
                requesting_node_id: requesting_node_id.to_string(),
            })
            .await
            .map_err(|status| Error::Unavailable(format!("{remote_directory_url} refused credentials: {status}")))?
            .into_inner();

        Ok(RegistryCredentials {
            remote_registry_url: response.remote_registry_url,
            basic_auth: BasicAuth {
                username: response.username,
                password: response.password,
            },
        })
    }
}
