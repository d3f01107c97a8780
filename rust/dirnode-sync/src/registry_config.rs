use std::path::Path;

use dirnode_core::{Cid, Error, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// One upstream entry in the registry's `extensions.sync` block (spec.md
/// §6 "Registry sync config (consumed interface)").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncUpstream {
    pub urls: Vec<String>,
    #[serde(rename = "onDemand")]
    pub on_demand: bool,
    #[serde(rename = "pollInterval")]
    pub poll_interval: String,
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    #[serde(rename = "retryDelay")]
    pub retry_delay: String,
    #[serde(rename = "tlsVerify")]
    pub tls_verify: bool,
    pub content: Vec<SyncContentFilter>,
    #[serde(rename = "credentialsFile")]
    pub credentials_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncContentFilter {
    pub prefix: String,
    pub tags: SyncTagFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncTagFilter {
    pub regex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SyncExtension {
    pub upstreams: Vec<SyncUpstream>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegistryExtensions {
    #[serde(default)]
    pub sync: SyncExtension,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub extensions: RegistryExtensions,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Tag filter that matches every tag; used when a sync is not partial.
pub const MATCH_ALL_TAGS: &str = ".*";

/// Builds the `tags.regex` for a (possibly partial) sync: an alternation
/// over each CID's record tag when `cids` is non-empty, otherwise
/// [MATCH_ALL_TAGS] (spec.md §4.5 step 3, §8 scenario S5).
pub fn tag_filter_for(cids: &[Cid]) -> String {
    if cids.is_empty() {
        return MATCH_ALL_TAGS.to_string();
    }
    let escaped: Vec<String> = cids
        .iter()
        .map(|cid| regex::escape(&format!("{}-{}", cid.algorithm(), cid.hex_digest())))
        .collect();
    format!("^({})$", escaped.join("|"))
}

/// Reads the registry config at `path`, or a default empty document if it
/// does not exist yet.
pub async fn read_config(path: &Path) -> Result<RegistryConfig> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(Error::from),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(RegistryConfig::default()),
        Err(error) => Err(Error::Internal(anyhow::anyhow!(
            "reading registry config {path:?}: {error}"
        ))),
    }
}

/// Writes the full config document atomically (write-temp-then-rename),
/// never merging in place (spec.md §9 "Hot-reloading the registry's sync
/// config").
pub async fn write_config(path: &Path, config: &RegistryConfig) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal(anyhow::anyhow!("registry config path has no parent")))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("mkdir {parent:?}: {error}")))?;

    let bytes = serde_json::to_vec_pretty(config)?;
    let temp_path = parent.join(format!(".tmp-registry-config-{}", uuid::Uuid::new_v4().simple()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("create {temp_path:?}: {error}")))?;
    file.write_all(&bytes)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("write {temp_path:?}: {error}")))?;
    file.flush()
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("flush {temp_path:?}: {error}")))?;
    drop(file);

    fs::rename(&temp_path, path)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("rename {temp_path:?} -> {path:?}: {error}")))?;
    Ok(())
}

/// Adds or replaces the upstream entry for `remote_registry_url`, keyed by
/// its `urls` list matching exactly (one upstream per sync row).
pub fn upsert_upstream(config: &mut RegistryConfig, upstream: SyncUpstream) {
    config
        .extensions
        .sync
        .upstreams
        .retain(|existing| existing.urls != upstream.urls);
    config.extensions.sync.upstreams.push(upstream);
}

/// Removes the upstream entry pointing at `remote_registry_url` (spec.md
/// §4.5 `SyncDelete` step 2).
pub fn remove_upstream(config: &mut RegistryConfig, remote_registry_url: &str) {
    config
        .extensions
        .sync
        .upstreams
        .retain(|upstream| !upstream.urls.iter().any(|url| url == remote_registry_url));
}

/// Writes basic-auth credentials to a side-car file with owner-only
/// permissions (spec.md §9 "Credentials file"). Never logs `password`.
pub async fn write_credentials_file(
    path: &Path,
    username: &str,
    password: &str,
) -> Result<()> {
    let body = serde_json::json!({ "username": username, "password": password });
    let bytes = serde_json::to_vec(&body)?;

    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal(anyhow::anyhow!("credentials path has no parent")))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("mkdir {parent:?}: {error}")))?;

    fs::write(path, &bytes)
        .await
        .map_err(|error| Error::Internal(anyhow::anyhow!("write credentials file: {error}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("chmod credentials file: {error}")))?;
    }

    info!("wrote credentials file {:?} ({} bytes, 0600)", path, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_filter_matches_all_when_not_partial() {
        assert_eq!(tag_filter_for(&[]), MATCH_ALL_TAGS);
    }

    #[test]
    fn tag_filter_is_anchored_alternation_for_partial_sync() {
        let cids = vec![Cid::digest(b"a"), Cid::digest(b"b")];
        let filter = tag_filter_for(&cids);
        assert!(filter.starts_with("^("));
        assert!(filter.ends_with(")$"));
        assert!(filter.contains('|'));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = RegistryConfig::default();
        upsert_upstream(
            &mut config,
            SyncUpstream {
                urls: vec!["https://remote.example".to_string()],
                on_demand: false,
                poll_interval: "5m".to_string(),
                max_retries: 3,
                retry_delay: "10s".to_string(),
                tls_verify: true,
                content: vec![SyncContentFilter {
                    prefix: "agents".to_string(),
                    tags: SyncTagFilter { regex: MATCH_ALL_TAGS.to_string() },
                }],
                credentials_file: "/etc/dirnode/creds.json".to_string(),
            },
        );

        write_config(&path, &config).await.unwrap();
        let read_back = read_config(&path).await.unwrap();
        assert_eq!(read_back, config);
    }

    #[tokio::test]
    async fn remove_upstream_drops_matching_entry() {
        let mut config = RegistryConfig::default();
        upsert_upstream(
            &mut config,
            SyncUpstream {
                urls: vec!["https://remote.example".to_string()],
                on_demand: false,
                poll_interval: "5m".to_string(),
                max_retries: 3,
                retry_delay: "10s".to_string(),
                tls_verify: true,
                content: vec![],
                credentials_file: "/etc/dirnode/creds.json".to_string(),
            },
        );
        remove_upstream(&mut config, "https://remote.example");
        assert!(config.extensions.sync.upstreams.is_empty());
    }
}
