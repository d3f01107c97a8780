//! The gateway's implementation of [dirnode_sync::RegistryInspector]: lists
//! newly-landed record manifests in the local OCI registry repository a
//! sync extension mirrors into (spec.md §4.5 "Monitor").

use std::collections::HashSet;

use async_trait::async_trait;
use dirnode_core::{Cid, Error, Result};
use dirnode_sync::RegistryInspector;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use tokio::sync::Mutex;

pub struct OciRegistryInspector {
    client: Mutex<Client>,
    registry: String,
    auth: RegistryAuth,
}

impl OciRegistryInspector {
    pub fn new(registry: &str, auth: RegistryAuth, insecure: bool) -> Self {
        let protocol = if insecure { ClientProtocol::Http } else { ClientProtocol::Https };
        OciRegistryInspector {
            client: Mutex::new(Client::new(ClientConfig { protocol, ..Default::default() })),
            registry: registry.to_string(),
            auth,
        }
    }

    fn probe_reference(&self, repository: &str) -> Result<Reference> {
        format!("{}/{}:probe", self.registry, repository)
            .parse()
            .map_err(|error| Error::Internal(anyhow::anyhow!("invalid oci reference: {error}")))
    }

    /// Record tags look like `<alg>-<hex>`; referrer tags carry extra
    /// `.`-separated segments, so this filters those out before attempting
    /// to parse a [Cid].
    fn tag_to_cid(tag: &str) -> Option<Cid> {
        if tag.contains('.') {
            return None;
        }
        let (alg, hex) = tag.split_once('-')?;
        format!("{alg}:{hex}").parse().ok()
    }
}

#[async_trait]
impl RegistryInspector for OciRegistryInspector {
    async fn list_new_manifests(&self, repository: &str, already_known: &HashSet<Cid>) -> Result<Vec<Cid>> {
        let reference = self.probe_reference(repository)?;
        let mut client = self.client.lock().await;
        let tags = client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(|error| Error::Unavailable(format!("listing tags for {repository}: {error}")))?
            .tags;
        drop(client);

        Ok(tags
            .iter()
            .filter_map(|tag| Self::tag_to_cid(tag))
            .filter(|cid| !already_known.contains(cid))
            .collect())
    }

    async fn has_pending_upstream_work(&self, _remote_registry_url: &str) -> Result<Option<bool>> {
        // The OCI distribution spec exposes no "work remaining" signal;
        // the monitor falls back to its N-empty-polls heuristic.
        Ok(None)
    }
}

/// Used when `STORE_PROVIDER` is `localfs`: there is no upstream registry
/// to poll, so every sync quiesces purely on the N-empty-polls heuristic.
pub struct NoopRegistryInspector;

#[async_trait]
impl RegistryInspector for NoopRegistryInspector {
    async fn list_new_manifests(&self, _repository: &str, _already_known: &HashSet<Cid>) -> Result<Vec<Cid>> {
        Ok(Vec::new())
    }

    async fn has_pending_upstream_work(&self, _remote_registry_url: &str) -> Result<Option<bool>> {
        Ok(None)
    }
}
