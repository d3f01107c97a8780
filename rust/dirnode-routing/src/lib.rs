//! The routing/search plane: a libp2p Kademlia DHT peer publishing and
//! resolving record labels, with a gossipsub announce/retract topic
//! (spec.md §4.4).

#[macro_use]
extern crate tracing;

mod behaviour;
mod channel;
mod node;
mod types;

pub use node::{announcement_bytes, provider_record_ttl, RoutingNode};
pub use types::{
    Announcement, LabelFilter, ListScope, NetworkInfo, PeerLabelCounts, SearchHit,
    ANNOUNCE_TOPIC, DEFAULT_MAX_HOPS, PROVIDER_RECORD_TTL,
};
