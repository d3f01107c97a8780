use spiffe::{SpiffeId, TrustDomain};

/// How an [Identity] was established (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Mtls,
    JwtSvid,
}

/// The authenticated caller, carried in request context by the gateway's
/// interceptor chain.
#[derive(Debug, Clone)]
pub struct Identity {
    pub spiffe_id: SpiffeId,
    pub method: AuthMethod,
}

impl Identity {
    pub fn trust_domain(&self) -> &TrustDomain {
        self.spiffe_id.trust_domain()
    }
}
