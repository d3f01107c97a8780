//! Record model, content identifiers, and canonicalization shared by every
//! other crate in the directory node.

#[macro_use]
extern crate tracing;

mod canonical;
mod cid;
mod error;
mod label;
mod record;

pub use canonical::{canonicalize, cid_for};
pub use cid::Cid;
pub use error::{Error, ErrorWithComponent, Result};
pub use label::{labels_for, Label};
pub use record::{Extension, Locator, Record, Signature, Skill};
