use dirnode_core::{Error, Result};
use spiffe::SpiffeId;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use crate::identity::{AuthMethod, Identity};

/// Lifts the caller's SPIFFE ID from a verified client certificate's SAN
/// extension (spec.md §4.7 "X.509 mTLS"). Expects mutual TLS to have already
/// verified the certificate chain; this only extracts identity.
pub fn identity_from_der(der: &[u8]) -> Result<Identity> {
    let (_, certificate) = X509Certificate::from_der(der)
        .map_err(|error| Error::Unauthenticated(format!("malformed client certificate: {error}")))?;

    let uris: Vec<&str> = certificate
        .extensions()
        .iter()
        .filter_map(|extension| match extension.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => Some(&san.general_names),
            _ => None,
        })
        .flatten()
        .filter_map(|name| match name {
            GeneralName::URI(uri) => Some(*uri),
            _ => None,
        })
        .collect();

    let spiffe_uri = first_spiffe_uri(uris.into_iter())
        .ok_or_else(|| Error::Unauthenticated("client certificate SAN has no spiffe:// URI".to_string()))?;

    let spiffe_id = spiffe_uri
        .parse::<SpiffeId>()
        .map_err(|error| Error::Unauthenticated(format!("invalid SPIFFE ID in certificate: {error}")))?;

    Ok(Identity { spiffe_id, method: AuthMethod::Mtls })
}

fn first_spiffe_uri<'a>(uris: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    uris.into_iter().find(|uri| uri.starts_with("spiffe://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_spiffe_uri_skips_non_spiffe_entries() {
        let uris = vec!["https://example.com", "spiffe://agentdir.example/node/a"];
        assert_eq!(first_spiffe_uri(uris.into_iter()), Some("spiffe://agentdir.example/node/a"));
    }

    #[test]
    fn first_spiffe_uri_is_none_when_absent() {
        let uris = vec!["https://example.com"];
        assert_eq!(first_spiffe_uri(uris.into_iter()), None);
    }
}
