#[macro_use]
extern crate tracing;

mod job;
mod monitor;
mod registry_config;
mod remote;
mod scheduler;
mod worker;

pub use job::SyncJob;
pub use monitor::{LabelPublisher, Monitor, NoopLabelPublisher, RegistryInspector, DEFAULT_QUIESCENCE_WINDOW};
pub use registry_config::{
    tag_filter_for, upsert_upstream, write_credentials_file, RegistryConfig, RegistryExtensions,
    SyncContentFilter, SyncExtension, SyncTagFilter, SyncUpstream, MATCH_ALL_TAGS,
};
pub use remote::{BasicAuth, RegistryCredentials, RemoteDirectoryClient};
pub use scheduler::Scheduler;
pub use worker::{WorkerConfig, WorkerPool};
