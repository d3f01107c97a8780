use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use dirnode_core::{Cid, Error, Label, Result};
use libp2p::kad::store::MemoryStore;
use libp2p::swarm::SwarmEvent;
use libp2p::{gossipsub, identify, kad, noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use futures::StreamExt as _;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::behaviour::{RoutingBehaviour, RoutingBehaviourEvent};
use crate::channel::{command_channel, CommandClient, CommandProcessor};
use crate::types::{
    Announcement, ListScope, NetworkInfo, PeerLabelCounts, SearchHit, ANNOUNCE_TOPIC,
    PROVIDER_RECORD_TTL,
};

fn label_key(label: &Label) -> kad::RecordKey {
    use sha2::{Digest, Sha256};
    kad::RecordKey::new(&Sha256::digest(label.as_str().as_bytes()).to_vec())
}

enum Command {
    Publish { cid: Cid, labels: Vec<Label> },
    Unpublish { cid: Cid, labels: Vec<Label> },
    ListProviders { label: Label, results: mpsc::Sender<(PeerId, Label, Option<Cid>)> },
    NetworkInfo,
    AddPeers { peers: Vec<Multiaddr> },
    Listen { address: Multiaddr },
    Bootstrap,
}

enum Response {
    Ack,
    NetworkInfo(NetworkInfo),
    ListenAddress(Multiaddr),
}

type Outcome = std::result::Result<Response, Error>;

/// A handle to a running routing swarm. Cloning shares the same background
/// swarm driver task via the command channel (spec.md §5: "The DHT host is
/// a single shared instance").
#[derive(Clone)]
pub struct RoutingNode {
    peer_id: PeerId,
    client: CommandClient<Command, Response, Error>,
}

impl RoutingNode {
    /// Builds a swarm over TCP + Noise + Yamux and spawns its driver task.
    /// `gossipsub_enabled` mirrors `ROUTING_GOSSIPSUB_ENABLED` (spec.md §6);
    /// when disabled, announcements are derived purely from DHT state.
    pub fn spawn(keypair: libp2p::identity::Keypair, gossipsub_enabled: bool) -> Result<Self> {
        let peer_id = PeerId::from(keypair.public());

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|error| Error::Internal(anyhow::anyhow!("swarm transport setup: {error}")))?
            .with_behaviour(|key| {
                let store = MemoryStore::new(peer_id);
                let kademlia = kad::Behaviour::new(peer_id, store);

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .build()
                    .expect("valid gossipsub config");
                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .expect("valid gossipsub behaviour");

                let identify = identify::Behaviour::new(identify::Config::new(
                    "/dirnode/routing/1.0.0".to_string(),
                    key.public(),
                ));

                RoutingBehaviour {
                    kademlia,
                    gossipsub,
                    identify,
                }
            })
            .map_err(|error| Error::Internal(anyhow::anyhow!("swarm behaviour setup: {error}")))?
            .build();

        if gossipsub_enabled {
            let topic = gossipsub::IdentTopic::new(ANNOUNCE_TOPIC);
            let _ = swarm.behaviour_mut().gossipsub.subscribe(&topic);
        }

        let (client, processor) = command_channel();
        tokio::spawn(run_swarm(swarm, processor, gossipsub_enabled));

        Ok(RoutingNode { peer_id, client })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub async fn listen(&self, address: Multiaddr) -> Result<Multiaddr> {
        match self.send(Command::Listen { address }).await? {
            Response::ListenAddress(addr) => Ok(addr),
            _ => Err(Error::Internal(anyhow::anyhow!("unexpected response to listen"))),
        }
    }

    pub async fn add_peers(&self, peers: Vec<Multiaddr>) -> Result<()> {
        self.send(Command::AddPeers { peers }).await.map(|_| ())
    }

    pub async fn bootstrap(&self) -> Result<()> {
        self.send(Command::Bootstrap).await.map(|_| ())
    }

    pub async fn network_info(&self) -> Result<NetworkInfo> {
        match self.send(Command::NetworkInfo).await? {
            Response::NetworkInfo(info) => Ok(info),
            _ => Err(Error::Internal(anyhow::anyhow!("unexpected response to network_info"))),
        }
    }

    /// Registers this node as a provider for every label derived from
    /// `cid`'s record (spec.md §4.4). Callers derive labels via
    /// `dirnode_core::labels_for` before calling this. Also emits a pubsub
    /// announce `{peer_id, cid, labels[]}` on [crate::types::ANNOUNCE_TOPIC]
    /// so peers learn the label->cid mapping without a DHT round trip.
    pub async fn publish(&self, cid: Cid, labels: Vec<Label>) -> Result<()> {
        self.send(Command::Publish { cid, labels }).await.map(|_| ())
    }

    /// Withdraws provider records for `labels` that are no longer covered by
    /// any other local record; callers compute that set via the database's
    /// `count_other_records_for_label` before calling this. Also emits a
    /// pubsub retract for `cid` on the announce topic.
    pub async fn unpublish(&self, cid: Cid, labels: Vec<Label>) -> Result<()> {
        self.send(Command::Unpublish { cid, labels }).await.map(|_| ())
    }

    /// Aggregates provider counts per label across the requested scope.
    /// Cancelling the returned stream (dropping it) aborts in-flight DHT
    /// queries promptly: the swarm driver detects the closed channel on its
    /// next send attempt and finishes the corresponding query (spec.md §4.4
    /// cancellation guarantee).
    pub async fn list(&self, filter: crate::types::LabelFilter) -> Result<ReceiverStream<PeerLabelCounts>> {
        let (tx, rx) = mpsc::channel(64);
        let mut per_peer: HashMap<PeerId, BTreeMap<String, u64>> = HashMap::new();

        if matches!(filter.scope, ListScope::Local) {
            per_peer.entry(self.peer_id).or_default();
        }

        for label in &filter.labels {
            let (result_tx, mut result_rx) = mpsc::channel(256);
            self.send(Command::ListProviders {
                label: label.clone(),
                results: result_tx,
            })
            .await?;

            while let Some((peer, label, _cid)) = result_rx.recv().await {
                *per_peer.entry(peer).or_default().entry(label.to_string()).or_insert(0) += 1;
            }
        }

        for (peer, label_counts) in per_peer {
            if tx.send(PeerLabelCounts { peer, label_counts }).await.is_err() {
                break;
            }
        }

        Ok(ReceiverStream::new(rx))
    }

    /// Unions provider lookups over every requested label, deduplicated by
    /// `(peer, cid)` (spec.md §4.4). A hit's CID is taken from a pubsub
    /// announce heard from that peer when available, since the DHT only
    /// stores provider records keyed by label, not CID; `resolve_cid` is the
    /// caller-supplied fallback (typically the local records index) for
    /// peers that haven't announced yet.
    pub async fn search(
        &self,
        labels: Vec<Label>,
        resolve_cid: impl Fn(&Label, &PeerId) -> Option<Cid>,
        deadline: Duration,
    ) -> Result<ReceiverStream<SearchHit>> {
        let (tx, rx) = mpsc::channel(64);
        let mut seen = std::collections::HashSet::new();

        let deadline_future = tokio::time::sleep(deadline);
        tokio::pin!(deadline_future);

        for label in &labels {
            let (result_tx, mut result_rx) = mpsc::channel(256);
            self.send(Command::ListProviders {
                label: label.clone(),
                results: result_tx,
            })
            .await?;

            loop {
                tokio::select! {
                    _ = &mut deadline_future => break,
                    item = result_rx.recv() => {
                        match item {
                            Some((peer, label, announced_cid)) => {
                                if let Some(cid) = announced_cid.or_else(|| resolve_cid(&label, &peer)) {
                                    if seen.insert((peer, cid.clone())) && tx.send(SearchHit { peer, cid }).await.is_err() {
                                        return Ok(ReceiverStream::new(rx));
                                    }
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        }

        Ok(ReceiverStream::new(rx))
    }

    async fn send(&self, command: Command) -> Result<Response> {
        self.client
            .send(command)
            .await
            .map_err(|error| Error::Internal(anyhow::anyhow!("routing swarm channel: {error}")))?
    }
}

async fn run_swarm(
    mut swarm: Swarm<RoutingBehaviour>,
    mut processor: CommandProcessor<Command, Response, Error>,
    gossipsub_enabled: bool,
) {
    let topic = gossipsub::IdentTopic::new(ANNOUNCE_TOPIC);
    let local_peer_id = *swarm.local_peer_id();
    let mut pending_providers: HashMap<kad::QueryId, (Label, mpsc::Sender<(PeerId, Label, Option<Cid>)>)> =
        HashMap::new();
    let mut announced: HashMap<(PeerId, Label), Cid> = HashMap::new();

    loop {
        tokio::select! {
            command = processor.recv() => {
                let Some(message) = command else { break };
                match message.request {
                    Command::Listen { address } => {
                        let outcome = swarm
                            .listen_on(address)
                            .map(|_| {
                                swarm
                                    .listeners()
                                    .next()
                                    .cloned()
                                    .unwrap_or_else(|| "/ip4/0.0.0.0/tcp/0".parse().unwrap())
                            })
                            .map_err(|error| Error::Internal(anyhow::anyhow!("listen: {error}")));
                        message.respond(outcome.map(Response::ListenAddress));
                    }
                    Command::AddPeers { peers } => {
                        for addr in peers {
                            if let Some(peer_id) = extract_peer_id(&addr) {
                                swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                            }
                        }
                        message.respond(Ok(Response::Ack));
                    }
                    Command::Bootstrap => {
                        let outcome = swarm
                            .behaviour_mut()
                            .kademlia
                            .bootstrap()
                            .map(|_| Response::Ack)
                            .map_err(|error| Error::Unavailable(format!("bootstrap: {error}")));
                        message.respond(outcome);
                    }
                    Command::NetworkInfo => {
                        let info = NetworkInfo {
                            peer_id: *swarm.local_peer_id(),
                            connected_peers: swarm.connected_peers().count(),
                            listen_addresses: swarm.listeners().cloned().collect(),
                        };
                        message.respond(Ok(Response::NetworkInfo(info)));
                    }
                    Command::Publish { cid, labels } => {
                        for label in &labels {
                            let key = label_key(label);
                            let _ = swarm.behaviour_mut().kademlia.start_providing(key);
                        }
                        announce(&mut swarm, &topic, gossipsub_enabled, local_peer_id, &cid, &labels, false);
                        message.respond(Ok(Response::Ack));
                    }
                    Command::Unpublish { cid, labels } => {
                        for label in &labels {
                            let key = label_key(label);
                            swarm.behaviour_mut().kademlia.stop_providing(&key);
                        }
                        announce(&mut swarm, &topic, gossipsub_enabled, local_peer_id, &cid, &labels, true);
                        message.respond(Ok(Response::Ack));
                    }
                    Command::ListProviders { label, results } => {
                        let key = label_key(&label);
                        let query_id = swarm.behaviour_mut().kademlia.get_providers(key);
                        pending_providers.insert(query_id, (label, results));
                        message.respond(Ok(Response::Ack));
                    }
                }
            }
            event = swarm.select_next_some() => {
                handle_swarm_event(event, &mut pending_providers, &mut announced);
            }
        }
    }
}

/// Publishes (or retracts) a [Announcement] for `cid` on the shared announce
/// topic (spec.md §4.4). A no-op when gossipsub is disabled, and a logged,
/// non-fatal event when there are no subscribed peers yet to relay to.
fn announce(
    swarm: &mut Swarm<RoutingBehaviour>,
    topic: &gossipsub::IdentTopic,
    gossipsub_enabled: bool,
    local_peer_id: PeerId,
    cid: &Cid,
    labels: &[Label],
    retract: bool,
) {
    if !gossipsub_enabled {
        return;
    }
    let announcement = Announcement {
        peer_id: local_peer_id.to_string(),
        cid: cid.to_string(),
        labels: labels.iter().map(|label| label.to_string()).collect(),
        retract,
    };
    let Ok(bytes) = announcement_bytes(&announcement) else {
        return;
    };
    if let Err(error) = swarm.behaviour_mut().gossipsub.publish(topic.clone(), bytes) {
        debug!("gossipsub announce for {cid} not relayed: {error}");
    }
}

fn handle_swarm_event(
    event: SwarmEvent<RoutingBehaviourEvent>,
    pending_providers: &mut HashMap<kad::QueryId, (Label, mpsc::Sender<(PeerId, Label, Option<Cid>)>)>,
    announced: &mut HashMap<(PeerId, Label), Cid>,
) {
    match event {
        SwarmEvent::Behaviour(RoutingBehaviourEvent::Kademlia(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })),
            step,
            ..
        })) => {
            if let Some((label, sender)) = pending_providers.get(&id) {
                for peer in providers {
                    let cid = announced.get(&(peer, label.clone())).cloned();
                    if sender.try_send((peer, label.clone(), cid)).is_err() {
                        pending_providers.remove(&id);
                        return;
                    }
                }
                if step.last {
                    pending_providers.remove(&id);
                }
            }
        }
        SwarmEvent::Behaviour(RoutingBehaviourEvent::Gossipsub(gossipsub::Event::Message {
            message,
            ..
        })) => {
            handle_announcement(&message.data, announced);
        }
        _ => {}
    }
}

/// Applies an inbound pubsub announce/retract (spec.md §4.4) to the local
/// peer->label->cid cache `search` consults before falling back to the DHT
/// caller's own records index. Malformed payloads are dropped; a hostile or
/// buggy peer on the shared topic cannot otherwise disrupt this node.
fn handle_announcement(payload: &[u8], announced: &mut HashMap<(PeerId, Label), Cid>) {
    let Ok(announcement) = serde_json::from_slice::<Announcement>(payload) else {
        return;
    };
    let Ok(peer) = announcement.peer_id.parse::<PeerId>() else {
        return;
    };
    let Ok(cid) = announcement.cid.parse::<Cid>() else {
        return;
    };

    for label in &announcement.labels {
        let Ok(label) = label.parse::<Label>() else { continue };
        if announcement.retract {
            announced.remove(&(peer, label));
        } else {
            announced.insert((peer, label), cid.clone());
        }
    }
}

fn extract_peer_id(address: &Multiaddr) -> Option<PeerId> {
    address.iter().find_map(|protocol| match protocol {
        libp2p::multiaddr::Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

/// Serializes an [Announcement] for the pubsub announce topic. Exposed so
/// callers that drive `Publish`/`Unpublish` at the gateway layer can build
/// the payload without reaching into swarm internals.
pub fn announcement_bytes(announcement: &Announcement) -> Result<Vec<u8>> {
    serde_json::to_vec(announcement).map_err(Error::from)
}

pub const fn provider_record_ttl() -> Duration {
    PROVIDER_RECORD_TTL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_key_is_deterministic() {
        let label = Label::new("skills", "forecast");
        assert_eq!(label_key(&label), label_key(&label));
    }

    #[test]
    fn distinct_labels_hash_differently() {
        let a = label_key(&Label::new("skills", "forecast"));
        let b = label_key(&Label::new("skills", "translation"));
        assert_ne!(a, b);
    }

    #[test]
    fn handle_announcement_populates_then_clears_the_cache() {
        let peer = PeerId::random();
        let cid = Cid::digest(b"agent-x");
        let label = Label::new("skills", "forecast");
        let mut announced: HashMap<(PeerId, Label), Cid> = HashMap::new();

        let announce = Announcement {
            peer_id: peer.to_string(),
            cid: cid.to_string(),
            labels: vec![label.to_string()],
            retract: false,
        };
        handle_announcement(&announcement_bytes(&announce).unwrap(), &mut announced);
        assert_eq!(announced.get(&(peer, label.clone())), Some(&cid));

        let retract = Announcement { retract: true, ..announce };
        handle_announcement(&announcement_bytes(&retract).unwrap(), &mut announced);
        assert!(announced.get(&(peer, label)).is_none());
    }

    #[test]
    fn handle_announcement_drops_malformed_payloads() {
        let mut announced: HashMap<(PeerId, Label), Cid> = HashMap::new();
        handle_announcement(b"not json", &mut announced);
        assert!(announced.is_empty());
    }
}
