//! Composition root: configuration, authn/authz wiring, gRPC service
//! implementations, and the federation client/inspector adapters that
//! `dirnode-sync` leaves to a transport-aware caller to supply.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod convert;
pub mod inspector;
pub mod interceptor;
pub mod remote;
pub mod services;

pub use config::Config;
pub use inspector::OciRegistryInspector;
pub use interceptor::AuthnInterceptor;
pub use remote::GrpcRemoteDirectoryClient;
