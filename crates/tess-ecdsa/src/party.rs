//! The party machine as an actor.
//!
//! A running party owns no network knowledge: it reads round messages from
//! its inbound mailbox, writes the messages it produces to its outbound
//! mailbox, and resolves its `done` channel exactly once. The session
//! engine wires the mailboxes to a network bridge and treats the first of
//! {result, error, cancellation} as terminal.

use crate::error::ProtocolError;
use crate::keyshare::{KeyShare, SignatureTriple};
use crate::preparams::PreParams;
use async_trait::async_trait;
use tess_core::{GroupInfo, ProtocolMessage, SessionId};
use tokio::sync::{mpsc, oneshot};

/// Mailboxes of a spawned party machine.
pub struct RunningParty<O> {
    /// Round messages addressed to this party.
    pub inbound: mpsc::Sender<ProtocolMessage>,
    /// Round messages this party produced, in emission order.
    pub outbound: mpsc::Receiver<ProtocolMessage>,
    /// Terminal outcome; fires exactly once.
    pub done: oneshot::Receiver<Result<O, ProtocolError>>,
}

/// A pluggable threshold-ECDSA implementation.
///
/// Production deployments plug a GG19 implementation in here; the
/// [`crate::local::LocalSuite`] stand-in backs local mode and tests.
#[async_trait]
pub trait ProtocolSuite: Send + Sync + 'static {
    /// Generate one pre-parameters bundle. Callers bound this with the
    /// configured deadline.
    async fn generate_pre_params(&self) -> Result<PreParams, ProtocolError>;

    /// Spawn the key-generation party for this member of `group`.
    fn start_keygen(
        &self,
        group: &GroupInfo,
        session: &SessionId,
        pre_params: PreParams,
    ) -> Result<RunningParty<KeyShare>, ProtocolError>;

    /// Spawn the signing party for this member of `group` over `digest`.
    fn start_signing(
        &self,
        group: &GroupInfo,
        session: &SessionId,
        share: &KeyShare,
        digest: [u8; 32],
    ) -> Result<RunningParty<SignatureTriple>, ProtocolError>;
}
