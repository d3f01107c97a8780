mod routing;
mod search;
mod store;
mod sync;

pub use routing::RoutingServiceImpl;
pub use search::SearchServiceImpl;
pub use store::StoreServiceImpl;
pub use sync::{FederationCredentials, SyncServiceImpl};
