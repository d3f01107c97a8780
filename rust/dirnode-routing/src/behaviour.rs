use libp2p::{gossipsub, identify, kad, swarm::NetworkBehaviour};

/// Combined protocol set for the routing plane: Kademlia for provider-record
/// publish/lookup over labels, gossipsub for cross-node announce/retract,
/// identify so peers exchange listen addresses on connect.
#[derive(NetworkBehaviour)]
pub struct RoutingBehaviour {
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
}
