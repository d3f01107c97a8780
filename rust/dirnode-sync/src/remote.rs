use async_trait::async_trait;
use dirnode_core::Result;

/// Basic-auth credentials issued by a remote directory node for its OCI
/// registry (spec.md §4.5 step 1).
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub remote_registry_url: String,
    pub basic_auth: BasicAuth,
}

/// The federation handshake: a worker's window into a remote `SyncService`
/// (spec.md §6's `SyncService.RequestRegistryCredentials`). A gRPC-backed
/// implementation lives in `dirnode-gateway`, where a `tonic` channel is
/// available; this trait lets `dirnode-sync` stay transport-agnostic and
/// lets tests substitute an in-process fake.
#[async_trait]
pub trait RemoteDirectoryClient: Send + Sync {
    async fn request_registry_credentials(
        &self,
        remote_directory_url: &str,
        requesting_node_id: &str,
    ) -> Result<RegistryCredentials>;
}
