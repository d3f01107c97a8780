#[macro_use]
extern crate tracing;

mod identity;
mod jwt;
mod policy;
mod x509;

pub use identity::{AuthMethod, Identity};
pub use jwt::{JwtSvidValidator, JwtTrustSource};
pub use policy::{TrustDomainPolicy, CROSS_TRUST_DOMAIN_ALLOWLIST};
pub use x509::identity_from_der;
