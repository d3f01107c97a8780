use dirnode_core::{Error, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use spiffe::SpiffeId;

use crate::identity::{AuthMethod, Identity};

#[derive(Debug, Deserialize)]
struct SvidClaims {
    sub: String,
}

/// One configured JWT trust source: a decoding key valid for a set of
/// audiences (spec.md §4.7 "JWT-SVID"). A deployment typically has one
/// source per trusted issuer.
pub struct JwtTrustSource {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    audiences: Vec<String>,
}

impl JwtTrustSource {
    pub fn new(decoding_key: DecodingKey, algorithm: Algorithm, audiences: Vec<String>) -> Self {
        JwtTrustSource { decoding_key, algorithm, audiences }
    }
}

/// Validates a bearer JWT-SVID against every configured trust source and
/// audience; the first match wins (spec.md §4.7).
pub struct JwtSvidValidator {
    sources: Vec<JwtTrustSource>,
}

impl JwtSvidValidator {
    pub fn new(sources: Vec<JwtTrustSource>) -> Self {
        JwtSvidValidator { sources }
    }

    pub fn validate(&self, token: &str) -> Result<Identity> {
        for source in &self.sources {
            for audience in &source.audiences {
                let mut validation = Validation::new(source.algorithm);
                validation.set_audience(&[audience.clone()]);
                if let Ok(data) = decode::<SvidClaims>(token, &source.decoding_key, &validation) {
                    let spiffe_id = data.claims.sub.parse::<SpiffeId>().map_err(|error| {
                        Error::Unauthenticated(format!("JWT-SVID subject is not a valid SPIFFE ID: {error}"))
                    })?;
                    return Ok(Identity { spiffe_id, method: AuthMethod::JwtSvid });
                }
            }
        }
        Err(Error::Unauthenticated(
            "JWT-SVID did not validate against any configured trust source/audience".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        aud: &'a str,
        exp: usize,
    }

    fn token_for(sub: &str, aud: &str, secret: &[u8]) -> String {
        let claims = Claims { sub, aud, exp: 9_999_999_999 };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    #[test]
    fn validates_token_and_extracts_spiffe_id() {
        let secret = b"test-secret";
        let token = token_for("spiffe://agentdir.example/node/a", "directory", secret);

        let validator = JwtSvidValidator::new(vec![JwtTrustSource::new(
            DecodingKey::from_secret(secret),
            Algorithm::HS256,
            vec!["directory".to_string()],
        )]);

        let identity = validator.validate(&token).unwrap();
        assert_eq!(identity.spiffe_id.to_string(), "spiffe://agentdir.example/node/a");
        assert_eq!(identity.method, AuthMethod::JwtSvid);
    }

    #[test]
    fn rejects_token_for_unconfigured_audience() {
        let secret = b"test-secret";
        let token = token_for("spiffe://agentdir.example/node/a", "other-audience", secret);

        let validator = JwtSvidValidator::new(vec![JwtTrustSource::new(
            DecodingKey::from_secret(secret),
            Algorithm::HS256,
            vec!["directory".to_string()],
        )]);

        assert!(validator.validate(&token).is_err());
    }

    #[test]
    fn rejects_token_signed_with_wrong_key() {
        let token = token_for("spiffe://agentdir.example/node/a", "directory", b"wrong-secret");

        let validator = JwtSvidValidator::new(vec![JwtTrustSource::new(
            DecodingKey::from_secret(b"test-secret"),
            Algorithm::HS256,
            vec!["directory".to_string()],
        )]);

        assert!(validator.validate(&token).is_err());
    }
}
