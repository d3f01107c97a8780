use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cid::Cid;
use crate::error::{Error, Result};

/// A skill entry attached to a [Record]. `id` is the taxonomy identifier
/// (e.g. an OASF skill code) carried as a string to avoid assuming a
/// particular numbering scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A pointer to where an agent (or one of its artifacts) can be retrieved or
/// invoked, e.g. an OCI image reference or an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A named, versioned extension payload. `data` is opaque structured data
/// (e.g. an OASF extension schema instance); this directory treats it as an
/// arbitrary JSON value and does not interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A signature referrer attached to a record by subject CID. Carried inline
/// on [Record] for convenience but is cleared before canonicalization —
/// spec.md §3 models it as an attached referrer, not part of record
/// identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub algorithm: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_bundle: Option<String>,
    pub signed_at: chrono::DateTime<chrono::Utc>,
}

/// The central, immutable entity of the directory: an agent descriptor.
///
/// Vector fields (`authors`, `skills`, `locators`, `extensions`, `tags`)
/// preserve authoring order; that order is part of the record's identity
/// per spec.md §4.1 and must never be sorted or deduplicated during
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub locators: Vec<Locator>,
    #[serde(default)]
    pub extensions: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_record_cid: Option<Cid>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Record {
    /// Validates required fields per spec.md §4.1. Does not check the
    /// signature or CID; those are handled by the store and CID module
    /// respectively.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("record name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "record version must not be empty".into(),
            ));
        }
        for (index, locator) in self.locators.iter().enumerate() {
            if locator.kind.trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "locator[{index}] is missing a type"
                )));
            }
            if locator.url.trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "locator[{index}] is missing a url"
                )));
            }
        }
        Ok(())
    }

    /// Returns a copy of this record with `signature` cleared, ready for
    /// canonical serialization. See [crate::canonical::canonicalize].
    pub fn without_signature(&self) -> Record {
        let mut clone = self.clone();
        clone.signature = None;
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_record() -> Record {
        Record {
            name: "agent-x".into(),
            version: "v1.0.0".into(),
            description: None,
            authors: vec![],
            created_at: chrono::Utc::now(),
            skills: vec![],
            locators: vec![],
            extensions: vec![],
            signature: None,
            tags: vec![],
            previous_record_cid: None,
            annotations: BTreeMap::new(),
        }
    }

    #[test]
    fn rejects_empty_name() {
        let mut record = minimal_record();
        record.name = "".into();
        assert!(record.validate().is_err());
    }

    #[test]
    fn rejects_empty_version() {
        let mut record = minimal_record();
        record.version = "  ".into();
        assert!(record.validate().is_err());
    }

    #[test]
    fn rejects_locator_missing_type_or_url() {
        let mut record = minimal_record();
        record.locators.push(Locator {
            kind: "".into(),
            url: "oci://example.com/x".into(),
            size: None,
            digest: None,
            annotations: BTreeMap::new(),
        });
        assert!(record.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_record() {
        let mut record = minimal_record();
        record.locators.push(Locator {
            kind: "docker-image".into(),
            url: "oci://example.com/x".into(),
            size: None,
            digest: None,
            annotations: BTreeMap::new(),
        });
        assert!(record.validate().is_ok());
    }
}
