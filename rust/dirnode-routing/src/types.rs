use std::collections::BTreeMap;
use std::time::Duration;

use dirnode_core::{Cid, Label};
use libp2p::PeerId;
use serde::{Deserialize, Serialize};

/// Default bound on DHT hops walked by [crate::RoutingNode::list] when the
/// caller does not specify one (spec.md §4.4).
pub const DEFAULT_MAX_HOPS: u32 = 10;

/// Provider-record TTL before a label must be republished (spec.md §3's
/// "republishing extends the provider record TTL").
pub const PROVIDER_RECORD_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Pubsub topic every node subscribes to for cross-node label announcements.
pub const ANNOUNCE_TOPIC: &str = "dirnode/announce/v1";

/// Restricts [crate::RoutingNode::list] to a node's own view, a specific
/// peer, or the whole reachable network.
#[derive(Debug, Clone, Default)]
pub enum ListScope {
    #[default]
    Local,
    Peer(PeerId),
    Network,
}

#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    pub labels: Vec<Label>,
    pub scope: ListScope,
}

#[derive(Debug, Clone)]
pub struct PeerLabelCounts {
    pub peer: PeerId,
    pub label_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub peer: PeerId,
    pub cid: Cid,
}

/// Wire payload for the pubsub announce/retract topic (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub peer_id: String,
    pub cid: String,
    pub labels: Vec<String>,
    pub retract: bool,
}

#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub peer_id: PeerId,
    pub connected_peers: usize,
    pub listen_addresses: Vec<libp2p::Multiaddr>,
}
