use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dirnode_core::{canonicalize, cid_for, labels_for, Cid, Error, Record, Result};
use dirnode_db::Database;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::api::{RecordMetadata, Referrer, ReferrerKind, StoreApi};

/// Content-addressed filesystem backend: `<root>/blobs/<alg>/<hex>` for
/// record bodies, `<root>/refs/<subject-cid>/<kind>/<ref-digest>` for
/// referrers (spec.md §4.2). Every write is write-temp-then-rename.
pub struct LocalFsStore {
    root: PathBuf,
    db: Database,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>, db: Database) -> Self {
        LocalFsStore {
            root: root.into(),
            db,
        }
    }

    fn blob_path(&self, cid: &Cid) -> PathBuf {
        self.root
            .join("blobs")
            .join(cid.algorithm())
            .join(cid.hex_digest())
    }

    fn refs_dir(&self, subject: &Cid, kind: ReferrerKind) -> PathBuf {
        self.root
            .join("refs")
            .join(subject.as_str().replace(':', "_"))
            .join(kind.as_str())
    }

    /// Writes `bytes` to `path` by first writing to a sibling temp file and
    /// renaming over the destination, so a crash mid-write never leaves a
    /// partially-written blob visible under its final name.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("blob path has no parent: {path:?}")))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("mkdir {parent:?}: {error}")))?;

        let temp_path = parent.join(format!(
            ".tmp-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("create {temp_path:?}: {error}")))?;
        file.write_all(bytes)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("write {temp_path:?}: {error}")))?;
        file.flush()
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("flush {temp_path:?}: {error}")))?;
        drop(file);

        fs::rename(&temp_path, path).await.map_err(|error| {
            Error::Internal(anyhow::anyhow!("rename {temp_path:?} -> {path:?}: {error}"))
        })?;
        Ok(())
    }
}

#[async_trait]
impl StoreApi for LocalFsStore {
    async fn push(&self, record: &Record) -> Result<Cid> {
        record.validate()?;
        let cid = cid_for(record)?;
        let path = self.blob_path(&cid);

        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!("push {} already present, skipping write", cid);
            return Ok(cid);
        }

        let bytes = canonicalize(record)?;
        self.write_atomic(&path, &bytes).await?;
        self.db.upsert_record_index(&cid, record).await?;
        self.db.add_labels(&labels_for(record), &cid).await?;

        info!("pushed record {} ({} bytes)", cid, bytes.len());
        Ok(cid)
    }

    async fn pull(&self, cid: &Cid) -> Result<Record> {
        let path = self.blob_path(cid);
        let bytes = fs::read(&path)
            .await
            .map_err(|_| Error::NotFound(format!("record {cid}")))?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }

    async fn lookup(&self, cid: &Cid) -> Result<RecordMetadata> {
        let row = self.db.get_record_index(cid).await?;
        let path = self.blob_path(cid);
        let size = fs::metadata(&path)
            .await
            .map_err(|_| Error::NotFound(format!("record {cid}")))?
            .len();
        Ok(RecordMetadata {
            cid: row.cid,
            name: row.name,
            version: row.version,
            size,
        })
    }

    async fn delete(&self, cid: &Cid) -> Result<()> {
        let path = self.blob_path(cid);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("record {cid}")))
            }
            Err(error) => return Err(Error::Internal(anyhow::anyhow!("delete {path:?}: {error}"))),
        }

        let refs_root = self.root.join("refs").join(cid.as_str().replace(':', "_"));
        let _ = fs::remove_dir_all(&refs_root).await;

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
        let dir = self.refs_dir(subject, referrer.kind);
        let path = dir.join(digest.hex_digest());
        self.write_atomic(&path, &referrer.body).await?;
        Ok(digest.to_string())
    }

    async fn pull_referrer(&self, subject: &Cid, kind: ReferrerKind) -> Result<Referrer> {
        let dir = self.refs_dir(subject, kind);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|_| Error::NotFound(format!("{} referrer for {subject}", kind.as_str())))?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("read_dir {dir:?}: {error}")))?
        {
            let metadata = entry.metadata().await.map_err(|error| {
                Error::Internal(anyhow::anyhow!("stat {:?}: {error}", entry.path()))
            })?;
            let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                newest = Some((modified, entry.path()));
            }
        }

        let (_, path) = newest
            .ok_or_else(|| Error::NotFound(format!("{} referrer for {subject}", kind.as_str())))?;
        let body = fs::read(&path)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("read {path:?}: {error}")))?;

        Ok(Referrer {
            kind,
            media_type: "application/octet-stream".to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirnode_core::{Locator, Skill};
    use std::collections::BTreeMap;

    async fn store() -> (LocalFsStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        (LocalFsStore::new(dir.path(), db), dir)
    }

    fn record(name: &str) -> Record {
        Record {
            name: name.to_string(),
            version: "v1.0.0".to_string(),
            description: None,
            authors: vec![],
            created_at: chrono::Utc::now(),
            skills: vec![Skill {
                id: "10201".to_string(),
                name: "Text Completion".to_string(),
                annotations: BTreeMap::new(),
            }],
            locators: vec![Locator {
                kind: "docker-image".to_string(),
                url: "oci://example.com/x".to_string(),
                size: None,
                digest: None,
                annotations: BTreeMap::new(),
            }],
            extensions: vec![],
            signature: None,
            tags: vec![],
            previous_record_cid: None,
            annotations: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let (store, _dir) = store().await;
        let r = record("agent-x");
        let cid = store.push(&r).await.unwrap();
        let pulled = store.pull(&cid).await.unwrap();
        assert_eq!(pulled, r);
    }

    #[tokio::test]
    async fn push_is_idempotent_by_cid() {
        let (store, _dir) = store().await;
        let r = record("agent-x");
        let cid1 = store.push(&r).await.unwrap();
        let cid2 = store.push(&r).await.unwrap();
        assert_eq!(cid1, cid2);
    }

    #[tokio::test]
    async fn lookup_returns_metadata() {
        let (store, _dir) = store().await;
        let r = record("agent-x");
        let cid = store.push(&r).await.unwrap();
        let meta = store.lookup(&cid).await.unwrap();
        assert_eq!(meta.name, "agent-x");
        assert!(meta.size > 0);
    }

    #[tokio::test]
    async fn delete_removes_record_and_referrers() {
        let (store, _dir) = store().await;
        let r = record("agent-x");
        let cid = store.push(&r).await.unwrap();
        store
            .push_referrer(
                &cid,
                Referrer {
                    kind: ReferrerKind::Signature,
                    media_type: "application/vnd.dirnode.signature".to_string(),
                    body: b"sig-bytes".to_vec(),
                },
            )
            .await
            .unwrap();

        store.delete(&cid).await.unwrap();
        assert!(store.pull(&cid).await.is_err());
        assert!(store
            .pull_referrer(&cid, ReferrerKind::Signature)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn referrer_round_trip() {
        let (store, _dir) = store().await;
        let r = record("agent-x");
        let cid = store.push(&r).await.unwrap();
        let body = b"signature-bundle".to_vec();
        store
            .push_referrer(
                &cid,
                Referrer {
                    kind: ReferrerKind::Signature,
                    media_type: "application/vnd.dirnode.signature".to_string(),
                    body: body.clone(),
                },
            )
            .await
            .unwrap();

        let pulled = store.pull_referrer(&cid, ReferrerKind::Signature).await.unwrap();
        assert_eq!(pulled.body, body);
    }

    #[tokio::test]
    async fn push_referrer_requires_existing_subject() {
        let (store, _dir) = store().await;
        let missing = Cid::digest(b"nonexistent");
        let result = store
            .push_referrer(
                &missing,
                Referrer {
                    kind: ReferrerKind::Signature,
                    media_type: "application/octet-stream".to_string(),
                    body: b"x".to_vec(),
                },
            )
            .await;
        assert!(result.is_err());
    }
}
