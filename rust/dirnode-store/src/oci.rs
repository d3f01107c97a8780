use async_trait::async_trait;
use dirnode_core::{canonicalize, cid_for, labels_for, Cid, Error, Record, Result};
use dirnode_db::Database;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol, Config as OciConfig, ImageLayer};
use oci_distribution::manifest::OciImageManifest;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::api::{RecordMetadata, Referrer, ReferrerKind, StoreApi};

/// Artifact media type for a record manifest's config blob, so a consumer
/// can tell a directory record apart from an ordinary container image.
const RECORD_CONFIG_MEDIA_TYPE: &str = "application/vnd.dirnode.record.v1+json";
/// Media type for a referrer manifest (spec.md §4.2). Oci registries that
/// lack the native Referrers API still resolve these via the well-known tag
/// schema documented on [OciStore], which is what this backend writes.
const REFERRER_CONFIG_MEDIA_TYPE: &str = "application/vnd.dirnode.referrer.v1";

/// OCI registry-backed store (spec.md §4.2). Records are pushed as OCI
/// manifests whose config blob is the canonical record JSON; referrers are
/// pushed as their own manifests, tagged by the well-known referrers tag
/// schema `<subject-alg>-<subject-hex>.<kind>.<millis>-<short>`, since not
/// every OCI-compatible registry implements the dedicated Referrers API
/// endpoint. The millisecond timestamp keeps candidate tags for the same
/// subject/kind orderable by recency without a second manifest fetch per
/// candidate; `<short>` is a truncated hash of the kind and digest, just
/// enough to avoid same-millisecond collisions.
pub struct OciStore {
    client: Mutex<Client>,
    registry: String,
    repository: String,
    auth: RegistryAuth,
    db: Database,
}

impl OciStore {
    pub fn new(
        registry: &str,
        repository: &str,
        auth: RegistryAuth,
        insecure: bool,
        db: Database,
    ) -> Self {
        let protocol = if insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });
        OciStore {
            client: Mutex::new(client),
            registry: registry.to_string(),
            repository: repository.to_string(),
            auth,
            db,
        }
    }

    fn manifest_reference(&self, tag: &str) -> Result<Reference> {
        format!("{}/{}:{}", self.registry, self.repository, tag)
            .parse()
            .map_err(|error| Error::Internal(anyhow::anyhow!("invalid oci reference: {error}")))
    }

    fn record_tag(cid: &Cid) -> String {
        format!("{}-{}", cid.algorithm(), cid.hex_digest())
    }

    /// Tag prefix shared by every referrer of `kind` attached to `subject`,
    /// used to filter the repository's full tag list down to candidates.
    fn referrer_tag_prefix(subject: &Cid, kind: ReferrerKind) -> String {
        format!("{}-{}.{}.", subject.algorithm(), subject.hex_digest(), kind.as_str())
    }

    fn referrer_tag(subject: &Cid, kind: ReferrerKind, digest: &Cid, created_at_millis: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(digest.as_str().as_bytes());
        let short = hex::encode(hasher.finalize());

        format!(
            "{}{:016}-{}",
            Self::referrer_tag_prefix(subject, kind),
            created_at_millis.max(0),
            &short[..16]
        )
    }

    async fn list_repository_tags(&self) -> Result<Vec<String>> {
        let reference = format!("{}/{}:referrer-probe", self.registry, self.repository)
            .parse()
            .map_err(|error| Error::Internal(anyhow::anyhow!("invalid oci reference: {error}")))?;
        let mut client = self.client.lock().await;
        let tags = client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(|error| Error::Unavailable(format!("listing tags for {}/{}: {error}", self.registry, self.repository)))?
            .tags;
        Ok(tags)
    }

    async fn blob_exists(&self, tag: &str) -> bool {
        let reference = match self.manifest_reference(tag) {
            Ok(r) => r,
            Err(_) => return false,
        };
        let mut client = self.client.lock().await;
        client.pull_manifest(&reference, &self.auth).await.is_ok()
    }

    async fn push_manifest(
        &self,
        tag: &str,
        config_media_type: &str,
        config_bytes: Vec<u8>,
    ) -> Result<()> {
        let reference = self.manifest_reference(tag)?;
        let config = OciConfig {
            data: config_bytes,
            media_type: config_media_type.to_string(),
            annotations: None,
        };
        let layers: Vec<ImageLayer> = Vec::new();
        let manifest = OciImageManifest::build(&layers, &config, None);

        let mut client = self.client.lock().await;
        client
            .push(&reference, &layers, config, &self.auth, Some(manifest))
            .await
            .map_err(|error| Error::Unavailable(format!("oci push {reference}: {error}")))?;
        Ok(())
    }

    async fn pull_config_blob(&self, tag: &str) -> Result<Vec<u8>> {
        let reference = self.manifest_reference(tag)?;
        let mut client = self.client.lock().await;
        let (_manifest, _digest, config_bytes) = client
            .pull_manifest_and_config(&reference, &self.auth)
            .await
            .map_err(|_| Error::NotFound(format!("oci manifest {reference}")))?;
        Ok(config_bytes.into_bytes())
    }
}

#[async_trait]
impl StoreApi for OciStore {
    async fn push(&self, record: &Record) -> Result<Cid> {
        record.validate()?;
        let cid = cid_for(record)?;
        let tag = Self::record_tag(&cid);

        if self.blob_exists(&tag).await {
            debug!("push {} already present in registry, skipping upload", cid);
            return Ok(cid);
        }

        let bytes = canonicalize(record)?;
        self.push_manifest(&tag, RECORD_CONFIG_MEDIA_TYPE, bytes.clone())
            .await?;

        self.db.upsert_record_index(&cid, record).await?;
        self.db.add_labels(&labels_for(record), &cid).await?;

        info!("pushed record {} to {}/{} ({} bytes)", cid, self.registry, self.repository, bytes.len());
        Ok(cid)
    }

    async fn pull(&self, cid: &Cid) -> Result<Record> {
        let tag = Self::record_tag(cid);
        let bytes = self.pull_config_blob(&tag).await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    async fn lookup(&self, cid: &Cid) -> Result<RecordMetadata> {
        let row = self.db.get_record_index(cid).await?;
        let tag = Self::record_tag(cid);
        let bytes = self.pull_config_blob(&tag).await?;
        Ok(RecordMetadata {
            cid: row.cid,
            name: row.name,
            version: row.version,
            size: bytes.len() as u64,
        })
    }

    async fn delete(&self, cid: &Cid) -> Result<()> {
        let tag = Self::record_tag(cid);
        let reference = self.manifest_reference(&tag)?;
        let mut client = self.client.lock().await;
        client
            .delete_manifest(&reference, &self.auth)
            .await
            .map_err(|_| Error::NotFound(format!("record {cid}")))?;
        drop(client);

        self.db.remove_labels_for_record(cid).await?;
        self.db.delete_record_index(cid).await?;
        Ok(())
    }

    async fn push_referrer(&self, subject: &Cid, referrer: Referrer) -> Result<String> {
        if self.lookup(subject).await.is_err() {
            return Err(Error::InvalidArgument(format!(
                "subject {subject} does not exist"
            )));
        }

        let digest = Cid::digest(&referrer.body);
        let tag = Self::referrer_tag(subject, referrer.kind, &digest, chrono::Utc::now().timestamp_millis());
        self.push_manifest(&tag, REFERRER_CONFIG_MEDIA_TYPE, referrer.body)
            .await?;
        Ok(digest.to_string())
    }

    async fn pull_referrer(&self, subject: &Cid, kind: ReferrerKind) -> Result<Referrer> {
        let prefix = Self::referrer_tag_prefix(subject, kind);
        let tags = self.list_repository_tags().await?;

        let newest_tag = tags
            .into_iter()
            .filter(|tag| tag.starts_with(&prefix))
            .max_by(|a, b| a[prefix.len()..].cmp(&b[prefix.len()..]))
            .ok_or_else(|| Error::NotFound(format!("{} referrer for {subject}", kind.as_str())))?;

        let body = self.pull_config_blob(&newest_tag).await?;
        Ok(Referrer {
            kind,
            media_type: REFERRER_CONFIG_MEDIA_TYPE.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tag_is_stable_and_tag_safe() {
        let cid = Cid::digest(b"agent-x");
        let tag = OciStore::record_tag(&cid);
        assert!(tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn referrer_tag_encodes_subject_and_kind_and_stays_within_oci_tag_limit() {
        let subject = Cid::digest(b"agent-x");
        let digest = Cid::digest(b"sig-bytes");
        let tag = OciStore::referrer_tag(&subject, ReferrerKind::Signature, &digest, 1_700_000_000_000);
        assert!(tag.contains("signature"));
        assert!(tag.starts_with(&OciStore::referrer_tag_prefix(&subject, ReferrerKind::Signature)));
        assert!(tag.len() <= 128, "tag {tag} ({} chars) exceeds the OCI tag length limit", tag.len());
    }

    #[test]
    fn referrer_tag_orders_lexicographically_by_recency() {
        let subject = Cid::digest(b"agent-x");
        let digest = Cid::digest(b"sig-bytes");
        let earlier = OciStore::referrer_tag(&subject, ReferrerKind::Signature, &digest, 1_700_000_000_000);
        let later = OciStore::referrer_tag(&subject, ReferrerKind::Signature, &digest, 1_700_000_000_001);
        let prefix = OciStore::referrer_tag_prefix(&subject, ReferrerKind::Signature);
        assert!(later[prefix.len()..] > earlier[prefix.len()..]);
    }
}
