use crate::cid::Cid;
use crate::error::Result;
use crate::record::Record;

/// Produces the canonical byte representation of a record, per spec.md
/// §4.1: `signature` cleared, map keys sorted, and authored vector order
/// preserved. Map-key sorting falls out of `serde_json`'s default
/// `BTreeMap`-backed `Value` representation (the `preserve_order` feature
/// is not enabled anywhere in this workspace), so a plain `to_vec` over the
/// signature-cleared record is already canonical.
pub fn canonicalize(record: &Record) -> Result<Vec<u8>> {
    let stripped = record.without_signature();
    Ok(serde_json::to_vec(&stripped)?)
}

/// Derives the content identifier for `record`. Two calls on records whose
/// canonical bytes are byte-equal always return the same [Cid]
/// (spec.md §8, invariant 1).
pub fn cid_for(record: &Record) -> Result<Cid> {
    let bytes = canonicalize(record)?;
    let cid = Cid::digest(&bytes);
    trace!("computed cid {} over {} canonical bytes", cid, bytes.len());
    Ok(cid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Locator, Record, Skill};
    use std::collections::BTreeMap;

    fn sample() -> Record {
        Record {
            name: "agent-x".into(),
            version: "v1.0.0".into(),
            description: Some("an example agent".into()),
            authors: vec!["alice".into(), "bob".into()],
            created_at: chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc),
            skills: vec![Skill {
                id: "10201".into(),
                name: "Text Completion".into(),
                annotations: BTreeMap::new(),
            }],
            locators: vec![Locator {
                kind: "docker-image".into(),
                url: "oci://example.com/x".into(),
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

    #[test]
    fn equal_records_yield_equal_cids() {
        let a = sample();
        let b = sample();
        assert_eq!(cid_for(&a).unwrap(), cid_for(&b).unwrap());
    }

    #[test]
    fn signature_does_not_affect_cid() {
        let mut with_sig = sample();
        with_sig.signature = Some(crate::record::Signature {
            algorithm: "ed25519".into(),
            signature: "deadbeef".into(),
            certificate: None,
            content_type: "application/vnd.oasf.signature".into(),
            content_bundle: None,
            signed_at: chrono::Utc::now(),
        });
        assert_eq!(cid_for(&sample()).unwrap(), cid_for(&with_sig).unwrap());
    }

    #[test]
    fn author_order_is_part_of_identity() {
        let mut reordered = sample();
        reordered.authors.reverse();
        assert_ne!(cid_for(&sample()).unwrap(), cid_for(&reordered).unwrap());
    }

    #[test]
    fn differing_name_yields_differing_cid() {
        let mut other = sample();
        other.name = "agent-y".into();
        assert_ne!(cid_for(&sample()).unwrap(), cid_for(&other).unwrap());
    }
}
