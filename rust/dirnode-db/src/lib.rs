//! SQLite-backed durable metadata: sync/publication lifecycle rows, the
//! search index projection, and DHT label bookkeeping.

#[macro_use]
extern crate tracing;

mod db;
mod error;
mod labels;
mod publication;
mod records_index;
mod status;
mod sync;

pub use db::Database;
pub use publication::PublicationRow;
pub use records_index::RecordIndexRow;
pub use status::{PublicationStatus, SyncStatus};
pub use sync::SyncRow;
