//! Bridge between a party machine and the network provider.
//!
//! A bridge is created per session. It joins the keep's broadcast channel
//! and opens a unicast channel to every other group member, registers typed
//! receivers on all of them, and from then on presents the session with two
//! conceptual streams: validated inbound protocol messages, and a send
//! facility that routes outbound messages by recipient. Routing, sender
//! validation, and duplicate suppression stay behind this boundary.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tess_core::{GroupInfo, MemberId, ProtocolMessage, SessionId};
use tess_network::{
    BroadcastChannel, Incoming, NetworkProvider, PeerId, Subscription, TransportError,
    UnicastChannel,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Message type carrying protocol rounds on both channel flavors.
pub(crate) const PROTOCOL_TYPE: &str = "tess/protocol";

struct BridgeShared {
    session: SessionId,
    group: GroupInfo,
    seen: Mutex<HashSet<[u8; 32]>>,
    inbound_tx: mpsc::UnboundedSender<ProtocolMessage>,
    errors_tx: mpsc::Sender<TransportError>,
}

/// Per-session glue between the party machine and the transport.
pub struct NetworkBridge {
    shared: Arc<BridgeShared>,
    broadcast: Arc<dyn BroadcastChannel>,
    unicasts: HashMap<MemberId, Arc<dyn UnicastChannel>>,
    inbound_rx: Option<mpsc::UnboundedReceiver<ProtocolMessage>>,
    errors_rx: Option<mpsc::Receiver<TransportError>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl NetworkBridge {
    /// Join the keep's channels and start dispatching inbound messages.
    ///
    /// Receivers are registered immediately so that round messages from
    /// members that start fractionally earlier are buffered rather than
    /// lost.
    pub async fn open(
        provider: &dyn NetworkProvider,
        group: &GroupInfo,
        session: &SessionId,
    ) -> Result<Self, TransportError> {
        let broadcast = provider.broadcast_channel(group.keep_id().as_str()).await?;
        let mut unicasts = HashMap::new();
        for member in group.other_members() {
            let peer = PeerId::from_public_key(member.as_bytes().to_vec());
            let channel = provider.unicast_channel(&peer).await?;
            unicasts.insert(member.clone(), channel);
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::channel(16);
        let shared = Arc::new(BridgeShared {
            session: session.clone(),
            group: group.clone(),
            seen: Mutex::new(HashSet::new()),
            inbound_tx,
            errors_tx,
        });

        let bridge = Self {
            shared: shared.clone(),
            broadcast: broadcast.clone(),
            unicasts: unicasts.clone(),
            inbound_rx: Some(inbound_rx),
            errors_rx: Some(errors_rx),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };

        bridge.spawn_dispatcher(broadcast.recv(PROTOCOL_TYPE), true);
        for channel in unicasts.values() {
            bridge.spawn_dispatcher(channel.recv(PROTOCOL_TYPE), false);
        }
        Ok(bridge)
    }

    /// The keep's broadcast channel (shared with the readiness barrier).
    pub fn broadcast_channel(&self) -> Arc<dyn BroadcastChannel> {
        self.broadcast.clone()
    }

    /// Take the stream of validated inbound protocol messages.
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<ProtocolMessage>> {
        self.inbound_rx.take()
    }

    /// Take the bridge-wide transport error stream.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<TransportError>> {
        self.errors_rx.take()
    }

    /// Marshal and route one outbound message.
    ///
    /// Errors are returned for reporting; they are not session-fatal. The
    /// party machine's round timeouts decide whether missing traffic is.
    pub async fn send(&self, message: &ProtocolMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let payload = bincode::serialize(message).map_err(|e| TransportError::SendFailed {
            channel: self.shared.group.keep_id().to_string(),
            reason: format!("marshal failed: {e}"),
        })?;
        match &message.recipient {
            None => self.broadcast.send(PROTOCOL_TYPE, payload).await,
            Some(recipient) => {
                let channel =
                    self.unicasts
                        .get(recipient)
                        .ok_or_else(|| TransportError::SendFailed {
                            channel: self.shared.group.keep_id().to_string(),
                            reason: format!("no unicast channel to {recipient}"),
                        })?;
                channel.send(PROTOCOL_TYPE, payload).await
            }
        }
    }

    /// Unregister all receivers and stop accepting messages.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn spawn_dispatcher(&self, mut subscription: Subscription, from_broadcast: bool) {
        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            while let Some(incoming) = subscription.next().await {
                shared.dispatch(incoming, from_broadcast);
            }
        });
        self.tasks.lock().push(task);
    }
}

impl Drop for NetworkBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl BridgeShared {
    /// Validate, deduplicate, and forward one delivered message.
    fn dispatch(&self, incoming: Incoming, from_broadcast: bool) {
        let message: ProtocolMessage = match bincode::deserialize(&incoming.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping undecodable protocol payload");
                let _ = self.errors_tx.try_send(TransportError::Decode {
                    message_type: PROTOCOL_TYPE.to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };
        if message.session != self.session {
            debug!(session = %message.session, "dropping message from another session");
            return;
        }
        if message.sender == *self.group.this_member() {
            return;
        }
        if !self.group.is_member(&message.sender) {
            warn!(sender = %message.sender, "dropping message from party outside the group");
            return;
        }
        // The claimed party id must match the authenticated transport
        // identity it arrived under.
        match incoming.sender.member_id() {
            Ok(bound) if bound == message.sender => {}
            _ => {
                warn!(
                    peer = %incoming.sender,
                    claimed = %message.sender,
                    "dropping message whose sender does not match its transport identity"
                );
                return;
            }
        }
        if from_broadcast != message.is_broadcast() {
            warn!(
                sender = %message.sender,
                "dropping message delivered on the wrong channel flavor"
            );
            return;
        }
        if let Some(recipient) = &message.recipient {
            if recipient != self.group.this_member() {
                warn!(recipient = %recipient, "dropping misrouted point-to-point message");
                return;
            }
        }
        if !self.seen.lock().insert(dedup_key(&message)) {
            debug!(sender = %message.sender, "suppressing duplicate protocol message");
            return;
        }
        // Receiver side is unbounded; a send fails only after close.
        let _ = self.inbound_tx.send(message);
    }
}

fn dedup_key(message: &ProtocolMessage) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"TESS_BRIDGE_DEDUP");
    hasher.update(message.sender.as_bytes());
    hasher.update(&[u8::from(message.is_broadcast())]);
    hasher.update(&message.payload);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tess_network::inmem::InMemoryNetwork;

    fn member(byte: u8) -> MemberId {
        MemberId::from_bytes(vec![byte]).expect("member id")
    }

    fn group(this: u8) -> GroupInfo {
        GroupInfo::new(
            tess_core::KeepId::new("0xbeef"),
            member(this),
            vec![member(1), member(2), member(3)],
            1,
        )
        .expect("group")
    }

    fn message(sender: u8, recipient: Option<u8>, payload: &[u8]) -> Vec<u8> {
        let message = ProtocolMessage {
            sender: member(sender),
            recipient: recipient.map(member),
            session: SessionId::for_keygen(&tess_core::KeepId::new("0xbeef")),
            payload: payload.to_vec(),
        };
        bincode::serialize(&message).expect("serialize")
    }

    #[tokio::test]
    async fn duplicate_broadcasts_reach_the_party_once() {
        let network = InMemoryNetwork::new();
        let ours = network.join(vec![1]);
        let theirs = network.join(vec![2]);
        network.join(vec![3]);

        let session = SessionId::for_keygen(&tess_core::KeepId::new("0xbeef"));
        let mut bridge = NetworkBridge::open(&ours, &group(1), &session)
            .await
            .expect("bridge");
        let mut inbound = bridge.take_inbound().expect("inbound");

        let channel = theirs.broadcast_channel("0xbeef").await.expect("channel");
        let encoded = message(2, None, b"round-1");
        channel
            .send(PROTOCOL_TYPE, encoded.clone())
            .await
            .expect("send");
        channel.send(PROTOCOL_TYPE, encoded).await.expect("send");

        let first = inbound.recv().await.expect("message");
        assert_eq!(first.payload, b"round-1");
        let second =
            tokio::time::timeout(std::time::Duration::from_millis(30), inbound.recv()).await;
        assert!(second.is_err(), "duplicate must be suppressed");
    }

    #[tokio::test]
    async fn messages_from_outside_the_group_are_dropped() {
        let network = InMemoryNetwork::new();
        let ours = network.join(vec![1]);
        let outsider = network.join(vec![9]);
        network.join(vec![2]);
        network.join(vec![3]);

        let session = SessionId::for_keygen(&tess_core::KeepId::new("0xbeef"));
        let mut bridge = NetworkBridge::open(&ours, &group(1), &session)
            .await
            .expect("bridge");
        let mut inbound = bridge.take_inbound().expect("inbound");

        let channel = outsider.broadcast_channel("0xbeef").await.expect("channel");
        channel
            .send(PROTOCOL_TYPE, message(9, None, b"intruder"))
            .await
            .expect("send");

        let got = tokio::time::timeout(std::time::Duration::from_millis(30), inbound.recv()).await;
        assert!(got.is_err(), "non-member message must be dropped");
    }

    #[tokio::test]
    async fn spoofed_sender_identity_is_dropped() {
        let network = InMemoryNetwork::new();
        let ours = network.join(vec![1]);
        let spoofer = network.join(vec![3]);
        network.join(vec![2]);

        let session = SessionId::for_keygen(&tess_core::KeepId::new("0xbeef"));
        let mut bridge = NetworkBridge::open(&ours, &group(1), &session)
            .await
            .expect("bridge");
        let mut inbound = bridge.take_inbound().expect("inbound");

        // Member 3 claims to be member 2 inside the payload.
        let channel = spoofer.broadcast_channel("0xbeef").await.expect("channel");
        channel
            .send(PROTOCOL_TYPE, message(2, None, b"spoof"))
            .await
            .expect("send");

        let got = tokio::time::timeout(std::time::Duration::from_millis(30), inbound.recv()).await;
        assert!(got.is_err(), "spoofed sender must be dropped");
    }

    #[tokio::test]
    async fn close_stops_delivery() {
        let network = InMemoryNetwork::new();
        let ours = network.join(vec![1]);
        let theirs = network.join(vec![2]);
        network.join(vec![3]);

        let session = SessionId::for_keygen(&tess_core::KeepId::new("0xbeef"));
        let mut bridge = NetworkBridge::open(&ours, &group(1), &session)
            .await
            .expect("bridge");
        let mut inbound = bridge.take_inbound().expect("inbound");
        bridge.close();

        let channel = theirs.broadcast_channel("0xbeef").await.expect("channel");
        channel
            .send(PROTOCOL_TYPE, message(2, None, b"late"))
            .await
            .expect("send");
        tokio::task::yield_now().await;
        let got = tokio::time::timeout(std::time::Duration::from_millis(30), inbound.recv()).await;
        assert!(matches!(got, Ok(None) | Err(_)), "no delivery after close");
    }
}
