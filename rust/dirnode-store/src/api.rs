use async_trait::async_trait;
use dirnode_core::{Cid, Record, Result};

/// Kinds of referrer a subject record can carry (spec.md §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferrerKind {
    Signature,
    PublicKey,
}

impl ReferrerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferrerKind::Signature => "signature",
            ReferrerKind::PublicKey => "public-key",
        }
    }
}

/// An opaque referrer body attached to a subject record by CID.
#[derive(Debug, Clone, PartialEq)]
pub struct Referrer {
    pub kind: ReferrerKind,
    pub media_type: String,
    pub body: Vec<u8>,
}

/// Metadata returned by [StoreApi::lookup] without fetching the full record
/// body.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    pub cid: Cid,
    pub name: String,
    pub version: String,
    pub size: u64,
}

/// The contract both the OCI and local-filesystem backends implement
/// (spec.md §4.2). Every method is backend-agnostic; callers never branch
/// on which backend is active.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Canonicalizes, computes the CID, and persists `record`. Idempotent:
    /// re-pushing a byte-equal record returns the same CID without
    /// duplicate storage (spec.md §4.2, §9 "Idempotency of Push").
    async fn push(&self, record: &Record) -> Result<Cid>;

    /// Fetches the record stored under `cid`. `NOT_FOUND` if absent.
    async fn pull(&self, cid: &Cid) -> Result<Record>;

    /// Fetches lightweight metadata for `cid` without the full record body.
    async fn lookup(&self, cid: &Cid) -> Result<RecordMetadata>;

    /// Deletes the record and recursively deletes its referrer graph.
    async fn delete(&self, cid: &Cid) -> Result<()>;

    /// Attaches `referrer` to `subject`, returning a digest identifying this
    /// particular referrer body.
    async fn push_referrer(&self, subject: &Cid, referrer: Referrer) -> Result<String>;

    /// Fetches the most recently attached referrer of `kind` for `subject`.
    async fn pull_referrer(&self, subject: &Cid, kind: ReferrerKind) -> Result<Referrer>;
}
