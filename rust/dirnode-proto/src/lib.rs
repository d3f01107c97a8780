//! Generated protobuf/tonic bindings for the directory's gRPC surface
//! (spec.md §6). Hand-written code in this crate is limited to re-exports;
//! everything else comes out of `build.rs`.

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("dirnode_descriptor");

pub mod dirnode {
    pub mod v1 {
        tonic::include_proto!("dirnode.v1");
    }
}

pub use dirnode::v1::*;
