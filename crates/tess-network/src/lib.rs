//! # Tess Network
//!
//! The two delivery primitives the protocol layers build on: a named
//! broadcast channel (many-to-many, one per keep) and a unicast channel to
//! a specific peer. Payloads are routed by a message-type string; a
//! delivered type nobody subscribed to is dropped with a warning, matching
//! the unmarshaler-registry contract of the transport.
//!
//! The in-memory provider in [`inmem`] backs `start-local` and the test
//! suites; a libp2p-style provider implements the same traits out of tree.

pub mod error;
pub mod inmem;
pub mod peer;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use error::TransportError;
pub use peer::PeerId;

/// A message delivered on a channel.
///
/// `sender` is the transport-authenticated peer identity, not a claim made
/// inside the payload; receivers use it to validate payload-level sender
/// bindings.
#[derive(Debug, Clone)]
pub struct Incoming {
    /// Authenticated transport identity of the sender.
    pub sender: PeerId,
    /// Raw message payload.
    pub payload: Vec<u8>,
}

/// Receiver half of a typed channel registration.
///
/// Dropping the subscription unregisters the handler. Delivery is
/// asynchronous: a subscriber that is slow to drain never blocks delivery
/// to other subscribers on the same channel.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Incoming>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Incoming>) -> Self {
        Self { rx }
    }

    /// The next delivered message, or `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<Incoming> {
        self.rx.recv().await
    }
}

/// Named many-to-many channel; every joined peer observes every
/// successfully sent message exactly once, in the sender's send order.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// The channel name (a keep address string).
    fn name(&self) -> &str;

    /// Broadcast a payload under a message type.
    async fn send(&self, message_type: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Register a typed receiver. Multiple registrations for the same type
    /// all fire on each message.
    fn recv(&self, message_type: &str) -> Subscription;
}

/// Point-to-point channel to one peer; best-effort, in-order per
/// (sender, receiver) pair.
#[async_trait]
pub trait UnicastChannel: Send + Sync {
    /// The remote peer.
    fn peer(&self) -> &PeerId;

    /// Send a payload under a message type to the remote peer.
    async fn send(&self, message_type: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Register a typed receiver for messages from the remote peer.
    fn recv(&self, message_type: &str) -> Subscription;
}

/// Factory for the two channel flavors.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// This node's transport identity.
    fn local_peer(&self) -> PeerId;

    /// Join (or create) the named broadcast channel.
    async fn broadcast_channel(
        &self,
        name: &str,
    ) -> Result<Arc<dyn BroadcastChannel>, TransportError>;

    /// Open a unicast channel to a peer; fails if the peer is unknown.
    async fn unicast_channel(
        &self,
        peer: &PeerId,
    ) -> Result<Arc<dyn UnicastChannel>, TransportError>;
}

#[async_trait]
impl<T: NetworkProvider + ?Sized> NetworkProvider for Arc<T> {
    fn local_peer(&self) -> PeerId {
        (**self).local_peer()
    }

    async fn broadcast_channel(
        &self,
        name: &str,
    ) -> Result<Arc<dyn BroadcastChannel>, TransportError> {
        (**self).broadcast_channel(name).await
    }

    async fn unicast_channel(
        &self,
        peer: &PeerId,
    ) -> Result<Arc<dyn UnicastChannel>, TransportError> {
        (**self).unicast_channel(peer).await
    }
}
