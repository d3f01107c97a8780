use std::fmt;
use std::str::FromStr;

use serde::{de, ser, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// A content identifier: `<alg>:<hex>`, deterministically derived from a
/// record's canonical bytes with its `signature` cleared (spec.md §3, §4.1).
///
/// Treated as an opaque key everywhere outside of this module; the `<alg>`
/// prefix exists only to allow the hash function to evolve without breaking
/// existing callers that pattern-match the format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cid(String);

const ALGORITHM: &str = "sha256";

impl Cid {
    /// Hashes `bytes` with the directory's canonical digest function and
    /// returns the resulting [Cid].
    pub fn digest(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Cid(format!("{ALGORITHM}:{}", hex::encode(digest)))
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or("")
    }

    pub fn hex_digest(&self) -> &str {
        self.0.split_once(':').map(|(_, hex)| hex).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            Some((alg, hex)) if !alg.is_empty() && !hex.is_empty() => Ok(Cid(value.to_string())),
            _ => Err(Error::InvalidArgument(format!(
                "malformed content identifier: {value}"
            ))),
        }
    }
}

impl TryFrom<String> for Cid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cid> for String {
    fn from(value: Cid) -> Self {
        value.0
    }
}

impl ser::Serialize for Cid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> de::Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cid::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = Cid::digest(b"hello");
        let b = Cid::digest(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.algorithm(), "sha256");
    }

    #[test]
    fn different_bytes_differ() {
        assert_ne!(Cid::digest(b"hello"), Cid::digest(b"world"));
    }

    #[test]
    fn round_trips_through_string() {
        let cid = Cid::digest(b"agent-x");
        let parsed: Cid = cid.to_string().parse().unwrap();
        assert_eq!(cid, parsed);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(Cid::from_str("not-a-cid").is_err());
        assert!(Cid::from_str("sha256:").is_err());
        assert!(Cid::from_str(":abc").is_err());
    }
}
