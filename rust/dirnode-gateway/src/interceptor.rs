//! Authentication interceptor: lifts a [dirnode_authn::Identity] from the
//! transport (mTLS peer certificate or JWT-SVID bearer token) and attaches
//! it to the request's extensions (spec.md §4.7). Authorization is checked
//! per-call inside each service handler, since that is where the gRPC
//! method name is known.

use std::sync::Arc;

use dirnode_authn::{identity_from_der, Identity, JwtSvidValidator, TrustDomainPolicy};
use tonic::{Request, Status};

use crate::config::AuthnMode;
use crate::convert::error_to_status;

#[derive(Clone)]
pub struct AuthnInterceptor {
    enabled: bool,
    mode: AuthnMode,
    jwt_validator: Option<Arc<JwtSvidValidator>>,
}

impl AuthnInterceptor {
    pub fn new(enabled: bool, mode: AuthnMode, jwt_validator: Option<Arc<JwtSvidValidator>>) -> Self {
        AuthnInterceptor { enabled, mode, jwt_validator }
    }

    pub fn intercept(&self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if !self.enabled {
            return Ok(request);
        }

        let identity = match self.mode {
            AuthnMode::Mtls | AuthnMode::X509 => {
                let certs = request
                    .peer_certs()
                    .ok_or_else(|| Status::unauthenticated("no client certificate presented"))?;
                let cert = certs
                    .first()
                    .ok_or_else(|| Status::unauthenticated("empty client certificate chain"))?;
                identity_from_der(cert.as_ref()).map_err(error_to_status)?
            }
            AuthnMode::Jwt => {
                let validator = self.jwt_validator.as_ref().ok_or_else(|| {
                    Status::internal("JWT authentication mode is enabled without a configured validator")
                })?;
                let token = bearer_token(&request)?;
                validator.validate(&token).map_err(error_to_status)?
            }
        };

        request.extensions_mut().insert(identity);
        Ok(request)
    }
}

/// Checks the identity the interceptor attached (if authz is enabled)
/// against the trust-domain policy for `method` (e.g. `"StoreService.Push"`).
/// A no-op when authorization is disabled, mirroring `AuthnInterceptor`'s
/// own disabled-mode bypass.
pub fn authorize<T>(
    policy: Option<&TrustDomainPolicy>,
    request: &Request<T>,
    method: &str,
) -> Result<(), Status> {
    let Some(policy) = policy else { return Ok(()) };
    let identity = request
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| Status::unauthenticated("request carries no authenticated identity"))?;
    policy.authorize(identity, method).map_err(error_to_status)
}

fn bearer_token(request: &Request<()>) -> Result<String, Status> {
    let header = request
        .metadata()
        .get("authorization")
        .ok_or_else(|| Status::unauthenticated("missing authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| Status::unauthenticated("authorization header is not valid ASCII"))?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| Status::unauthenticated("authorization header is not a bearer token"))
}
