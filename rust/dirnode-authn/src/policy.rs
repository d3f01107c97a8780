use dirnode_core::{Error, Result};
use spiffe::TrustDomain;

use crate::identity::Identity;

/// Methods reachable by an identity outside the server's own trust domain
/// (spec.md §4.7).
pub const CROSS_TRUST_DOMAIN_ALLOWLIST: &[&str] = &[
    "StoreService.Pull",
    "StoreService.PullReferrer",
    "StoreService.Lookup",
    "SyncService.RequestRegistryCredentials",
];

/// Casbin-style rule engine: full access within the server's trust domain,
/// an explicit method allow-list for every other trust domain (spec.md
/// §4.7).
pub struct TrustDomainPolicy {
    server_trust_domain: TrustDomain,
}

impl TrustDomainPolicy {
    pub fn new(server_trust_domain: TrustDomain) -> Self {
        TrustDomainPolicy { server_trust_domain }
    }

    pub fn authorize(&self, identity: &Identity, method: &str) -> Result<()> {
        if identity.trust_domain() == &self.server_trust_domain {
            return Ok(());
        }
        if CROSS_TRUST_DOMAIN_ALLOWLIST.contains(&method) {
            return Ok(());
        }
        warn!(
            "denied {method} for trust domain {} (server trust domain {})",
            identity.trust_domain(),
            self.server_trust_domain
        );
        Err(Error::PermissionDenied(format!(
            "{method} is not permitted for trust domain {}",
            identity.trust_domain()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthMethod;
    use spiffe::SpiffeId;
    use std::str::FromStr;

    fn identity(spiffe_id: &str) -> Identity {
        Identity { spiffe_id: SpiffeId::from_str(spiffe_id).unwrap(), method: AuthMethod::Mtls }
    }

    #[test]
    fn same_trust_domain_allows_every_method() {
        let policy = TrustDomainPolicy::new(TrustDomain::from_str("agentdir.example").unwrap());
        let caller = identity("spiffe://agentdir.example/node/a");
        assert!(policy.authorize(&caller, "StoreService.Delete").is_ok());
    }

    #[test]
    fn other_trust_domain_allows_only_the_allowlist() {
        let policy = TrustDomainPolicy::new(TrustDomain::from_str("agentdir.example").unwrap());
        let caller = identity("spiffe://partner.example/node/b");

        assert!(policy.authorize(&caller, "StoreService.Pull").is_ok());
        assert!(policy.authorize(&caller, "StoreService.Push").is_err());
    }
}
