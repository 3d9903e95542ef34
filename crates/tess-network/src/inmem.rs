//! In-memory network provider for `start-local` and tests.
//!
//! A hub owns the mailboxes of every joined peer; sends push synchronously
//! onto unbounded per-subscription queues under the hub lock, which gives
//! each observer the sender's send order without letting a slow subscriber
//! block anyone.

use crate::error::TransportError;
use crate::peer::PeerId;
use crate::{BroadcastChannel, Incoming, NetworkProvider, Subscription, UnicastChannel};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

type SubscriberList = Vec<mpsc::UnboundedSender<Incoming>>;

#[derive(Default)]
struct PeerNode {
    joined: HashSet<String>,
    // (channel name, message type) -> receivers
    broadcast_subs: HashMap<(String, String), SubscriberList>,
    // (remote peer, message type) -> receivers
    unicast_subs: HashMap<(PeerId, String), SubscriberList>,
}

#[derive(Default)]
struct HubInner {
    peers: Mutex<HashMap<PeerId, PeerNode>>,
}

/// Process-wide in-memory network hub.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    hub: Arc<HubInner>,
}

impl InMemoryNetwork {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the hub as the node owning `public_key`.
    pub fn join(&self, public_key: impl Into<Vec<u8>>) -> InMemoryProvider {
        let local = PeerId::from_public_key(public_key);
        self.hub
            .peers
            .lock()
            .entry(local.clone())
            .or_default();
        InMemoryProvider {
            hub: self.hub.clone(),
            local,
        }
    }
}

/// One peer's handle onto the in-memory network.
#[derive(Clone)]
pub struct InMemoryProvider {
    hub: Arc<HubInner>,
    local: PeerId,
}

#[async_trait]
impl NetworkProvider for InMemoryProvider {
    fn local_peer(&self) -> PeerId {
        self.local.clone()
    }

    async fn broadcast_channel(
        &self,
        name: &str,
    ) -> Result<Arc<dyn BroadcastChannel>, TransportError> {
        let mut peers = self.hub.peers.lock();
        let node = peers.entry(self.local.clone()).or_default();
        node.joined.insert(name.to_string());
        Ok(Arc::new(InMemoryBroadcast {
            hub: self.hub.clone(),
            local: self.local.clone(),
            name: name.to_string(),
        }))
    }

    async fn unicast_channel(
        &self,
        peer: &PeerId,
    ) -> Result<Arc<dyn UnicastChannel>, TransportError> {
        if !self.hub.peers.lock().contains_key(peer) {
            return Err(TransportError::UnknownPeer { peer: peer.clone() });
        }
        Ok(Arc::new(InMemoryUnicast {
            hub: self.hub.clone(),
            local: self.local.clone(),
            remote: peer.clone(),
        }))
    }
}

struct InMemoryBroadcast {
    hub: Arc<HubInner>,
    local: PeerId,
    name: String,
}

#[async_trait]
impl BroadcastChannel for InMemoryBroadcast {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message_type: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut peers = self.hub.peers.lock();
        for (peer_id, node) in peers.iter_mut() {
            if *peer_id == self.local || !node.joined.contains(&self.name) {
                continue;
            }
            let key = (self.name.clone(), message_type.to_string());
            deliver(
                node.broadcast_subs.get_mut(&key),
                Incoming {
                    sender: self.local.clone(),
                    payload: payload.clone(),
                },
                &self.name,
                message_type,
            );
        }
        Ok(())
    }

    fn recv(&self, message_type: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut peers = self.hub.peers.lock();
        let node = peers.entry(self.local.clone()).or_default();
        node.broadcast_subs
            .entry((self.name.clone(), message_type.to_string()))
            .or_default()
            .push(tx);
        Subscription::new(rx)
    }
}

struct InMemoryUnicast {
    hub: Arc<HubInner>,
    local: PeerId,
    remote: PeerId,
}

#[async_trait]
impl UnicastChannel for InMemoryUnicast {
    fn peer(&self) -> &PeerId {
        &self.remote
    }

    async fn send(&self, message_type: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut peers = self.hub.peers.lock();
        let node = peers
            .get_mut(&self.remote)
            .ok_or_else(|| TransportError::SendFailed {
                channel: format!("unicast:{}", self.remote),
                reason: "peer left the network".to_string(),
            })?;
        let key = (self.local.clone(), message_type.to_string());
        deliver(
            node.unicast_subs.get_mut(&key),
            Incoming {
                sender: self.local.clone(),
                payload,
            },
            "unicast",
            message_type,
        );
        Ok(())
    }

    fn recv(&self, message_type: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut peers = self.hub.peers.lock();
        let node = peers.entry(self.local.clone()).or_default();
        node.unicast_subs
            .entry((self.remote.clone(), message_type.to_string()))
            .or_default()
            .push(tx);
        Subscription::new(rx)
    }
}

fn deliver(
    subscribers: Option<&mut SubscriberList>,
    message: Incoming,
    channel: &str,
    message_type: &str,
) {
    let Some(subscribers) = subscribers else {
        warn!(channel, message_type, "dropping message with no registered receiver");
        return;
    };
    subscribers.retain(|tx| !tx.is_closed());
    if subscribers.is_empty() {
        warn!(channel, message_type, "dropping message with no registered receiver");
        return;
    }
    for tx in subscribers.iter() {
        let _ = tx.send(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPE: &str = "test/message";

    #[tokio::test]
    async fn broadcast_reaches_all_other_joined_peers_in_order() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let bob = network.join(vec![2]);
        let carol = network.join(vec![3]);

        let alice_chan = alice.broadcast_channel("keep").await.expect("channel");
        let bob_chan = bob.broadcast_channel("keep").await.expect("channel");
        let carol_chan = carol.broadcast_channel("keep").await.expect("channel");

        let mut bob_rx = bob_chan.recv(TYPE);
        let mut carol_rx = carol_chan.recv(TYPE);

        for i in 0..3u8 {
            alice_chan.send(TYPE, vec![i]).await.expect("send");
        }

        for rx in [&mut bob_rx, &mut carol_rx] {
            for i in 0..3u8 {
                let msg = rx.next().await.expect("message");
                assert_eq!(msg.payload, vec![i]);
                assert_eq!(msg.sender, alice.local_peer());
            }
        }
    }

    #[tokio::test]
    async fn sender_does_not_observe_its_own_broadcast() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let chan = alice.broadcast_channel("keep").await.expect("channel");
        let mut rx = chan.recv(TYPE);
        chan.send(TYPE, vec![9]).await.expect("send");
        let got = tokio::time::timeout(std::time::Duration::from_millis(20), rx.next()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn unregistered_type_is_dropped() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let bob = network.join(vec![2]);
        let alice_chan = alice.broadcast_channel("keep").await.expect("channel");
        let bob_chan = bob.broadcast_channel("keep").await.expect("channel");

        let mut other_rx = bob_chan.recv("other/type");
        alice_chan.send(TYPE, vec![1]).await.expect("send");
        let got = tokio::time::timeout(std::time::Duration::from_millis(20), other_rx.next()).await;
        assert!(got.is_err());
    }

    #[tokio::test]
    async fn multiple_receivers_of_one_type_all_fire() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let bob = network.join(vec![2]);
        let alice_chan = alice.broadcast_channel("keep").await.expect("channel");
        let bob_chan = bob.broadcast_channel("keep").await.expect("channel");

        let mut first = bob_chan.recv(TYPE);
        let mut second = bob_chan.recv(TYPE);
        alice_chan.send(TYPE, vec![7]).await.expect("send");
        assert_eq!(first.next().await.expect("message").payload, vec![7]);
        assert_eq!(second.next().await.expect("message").payload, vec![7]);
    }

    #[tokio::test]
    async fn unicast_to_unknown_peer_fails_to_open() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let ghost = PeerId::from_public_key(vec![0xEE]);
        let result = alice.unicast_channel(&ghost).await;
        let err = match result {
            Err(e) => e,
            Ok(_) => panic!("unknown"),
        };
        assert!(matches!(err, TransportError::UnknownPeer { .. }));
    }

    #[tokio::test]
    async fn unicast_delivers_in_order_from_the_right_peer() {
        let network = InMemoryNetwork::new();
        let alice = network.join(vec![1]);
        let bob = network.join(vec![2]);
        let carol = network.join(vec![3]);

        let alice_to_bob = alice
            .unicast_channel(&bob.local_peer())
            .await
            .expect("channel");
        let carol_to_bob = carol
            .unicast_channel(&bob.local_peer())
            .await
            .expect("channel");
        let bob_from_alice = bob
            .unicast_channel(&alice.local_peer())
            .await
            .expect("channel");

        let mut rx = bob_from_alice.recv(TYPE);
        alice_to_bob.send(TYPE, vec![1]).await.expect("send");
        carol_to_bob.send(TYPE, vec![99]).await.expect("send");
        alice_to_bob.send(TYPE, vec![2]).await.expect("send");

        assert_eq!(rx.next().await.expect("message").payload, vec![1]);
        assert_eq!(rx.next().await.expect("message").payload, vec![2]);
    }
}
