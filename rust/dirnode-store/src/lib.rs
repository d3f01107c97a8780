//! Content-addressed record storage: a shared [StoreApi] contract with an
//! OCI registry backend and a local-filesystem backend (spec.md §4.2).

#[macro_use]
extern crate tracing;

mod api;
mod localfs;
mod oci;

pub use api::{RecordMetadata, Referrer, ReferrerKind, StoreApi};
pub use localfs::LocalFsStore;
pub use oci::OciStore;
