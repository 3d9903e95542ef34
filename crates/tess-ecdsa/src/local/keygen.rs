//! Dealer-based key generation for the local suite.
//!
//! The lowest-indexed member deals Shamir shares of a freshly sampled
//! secret once every member has contributed entropy through a broadcast
//! commitment. Every member acknowledges the dealt public key; a party
//! completes only after all acknowledgements match, so a finished run
//! guarantees the whole group holds the same key.
//!
//! Message order within a round is arbitrary; state is accumulated until
//! the completion conditions hold.

use crate::error::ProtocolError;
use crate::keyshare::{GroupPublicKey, KeyShare, SecretShare};
use crate::local::curve::{point_to_public_key, scalar_from_bytes, scalar_to_bytes};
use crate::local::KeygenPayload;
use crate::preparams::PreParams;
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::BTreeMap;
use tess_core::{GroupInfo, ProtocolMessage, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(super) struct KeygenParty {
    group: GroupInfo,
    session: SessionId,
    pre_params: PreParams,
    out: mpsc::Sender<ProtocolMessage>,
    commitments: BTreeMap<usize, [u8; 32]>,
    acks: BTreeMap<usize, [u8; 32]>,
    share: Option<Scalar>,
    public_key: Option<GroupPublicKey>,
    dealt: bool,
    acked: bool,
}

impl KeygenParty {
    pub(super) fn new(
        group: GroupInfo,
        session: SessionId,
        pre_params: PreParams,
        out: mpsc::Sender<ProtocolMessage>,
    ) -> Self {
        Self {
            group,
            session,
            pre_params,
            out,
            commitments: BTreeMap::new(),
            acks: BTreeMap::new(),
            share: None,
            public_key: None,
            dealt: false,
            acked: false,
        }
    }

    pub(super) async fn run(
        mut self,
        mut inbound: mpsc::Receiver<ProtocolMessage>,
    ) -> Result<KeyShare, ProtocolError> {
        let me = self.group.this_member_index();
        let commitment = self.commitment(me);
        self.commitments.insert(me, commitment);
        self.broadcast(&KeygenPayload::Commit { commitment }).await?;
        self.advance().await?;

        loop {
            if let Some(share) = self.try_finish()? {
                return Ok(share);
            }
            let message = inbound.recv().await.ok_or(ProtocolError::Terminated)?;
            self.handle(message).await?;
            self.advance().await?;
        }
    }

    async fn handle(&mut self, message: ProtocolMessage) -> Result<(), ProtocolError> {
        if message.session != self.session {
            debug!(session = %message.session, "ignoring message from another session");
            return Ok(());
        }
        let Some(sender) = self.group.member_index(&message.sender) else {
            warn!(sender = %message.sender, "ignoring keygen message from non-member");
            return Ok(());
        };
        let payload: KeygenPayload = bincode::deserialize(&message.payload)
            .map_err(|e| ProtocolError::round("keygen", format!("undecodable payload: {e}")))?;
        match payload {
            KeygenPayload::Commit { commitment } => {
                self.commitments.insert(sender, commitment);
            }
            KeygenPayload::Share { share } => {
                if sender != 0 {
                    return Err(ProtocolError::round(
                        "keygen",
                        format!("share dealt by non-dealer party {sender}"),
                    ));
                }
                self.share = Some(scalar_from_bytes(&share)?);
            }
            KeygenPayload::PublicKey { x, y } => {
                if sender != 0 {
                    return Err(ProtocolError::round(
                        "keygen",
                        format!("public key dealt by non-dealer party {sender}"),
                    ));
                }
                self.public_key = Some(GroupPublicKey { x, y });
            }
            KeygenPayload::Ack { digest } => {
                self.acks.insert(sender, digest);
            }
        }
        Ok(())
    }

    /// Take whatever protocol steps have become possible.
    async fn advance(&mut self) -> Result<(), ProtocolError> {
        let me = self.group.this_member_index();
        if me == 0 && !self.dealt && self.commitments.len() == self.group.members().len() {
            self.deal().await?;
        }
        if !self.acked {
            if let Some(public_key) = self.public_key {
                if self.share.is_some() {
                    let digest = ack_digest(&public_key);
                    self.acks.insert(me, digest);
                    self.broadcast(&KeygenPayload::Ack { digest }).await?;
                    self.acked = true;
                }
            }
        }
        Ok(())
    }

    /// Sample the group key and distribute shares. Dealer only.
    async fn deal(&mut self) -> Result<(), ProtocolError> {
        let mut rng = ChaCha20Rng::from_seed(self.seed());
        let threshold = self.group.dishonest_threshold();
        let coefficients: Vec<Scalar> =
            (0..=threshold).map(|_| Scalar::random(&mut rng)).collect();

        let public_point = ProjectivePoint::GENERATOR * coefficients[0];
        let public_key = point_to_public_key(&public_point)?;

        for (index, member) in self.group.members().to_vec().into_iter().enumerate() {
            let share = evaluate(&coefficients, (index + 1) as u64);
            if member == *self.group.this_member() {
                self.share = Some(share);
            } else {
                self.unicast(
                    member,
                    &KeygenPayload::Share {
                        share: scalar_to_bytes(&share),
                    },
                )
                .await?;
            }
        }
        self.broadcast(&KeygenPayload::PublicKey {
            x: public_key.x,
            y: public_key.y,
        })
        .await?;
        self.public_key = Some(public_key);
        self.dealt = true;
        Ok(())
    }

    fn try_finish(&self) -> Result<Option<KeyShare>, ProtocolError> {
        let (Some(share), Some(public_key)) = (self.share.as_ref(), self.public_key) else {
            return Ok(None);
        };
        if !self.acked || self.acks.len() < self.group.members().len() {
            return Ok(None);
        }
        let expected = ack_digest(&public_key);
        for (party, digest) in &self.acks {
            if *digest != expected {
                return Err(ProtocolError::round(
                    "keygen",
                    format!("party {party} acknowledged a different public key"),
                ));
            }
        }
        Ok(Some(KeyShare {
            party_index: self.group.this_member_index() as u16,
            threshold: self.group.dishonest_threshold() as u16,
            public_key,
            secret_share: SecretShare::from_bytes(scalar_to_bytes(share)),
        }))
    }

    /// Entropy commitment for one member.
    fn commitment(&self, index: usize) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"TESS_LOCAL_KEYGEN_COMMIT");
        hasher.update(&(index as u64).to_be_bytes());
        hasher.update(self.pre_params.entropy());
        *hasher.finalize().as_bytes()
    }

    /// Dealer RNG seed: bound to the session and every member's commitment.
    fn seed(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"TESS_LOCAL_KEYGEN_SEED");
        hasher.update(self.session.as_str().as_bytes());
        for (index, commitment) in &self.commitments {
            hasher.update(&(*index as u64).to_be_bytes());
            hasher.update(commitment);
        }
        hasher.update(self.pre_params.entropy());
        *hasher.finalize().as_bytes()
    }

    async fn broadcast(&self, payload: &KeygenPayload) -> Result<(), ProtocolError> {
        self.send(None, payload).await
    }

    async fn unicast(
        &self,
        recipient: tess_core::MemberId,
        payload: &KeygenPayload,
    ) -> Result<(), ProtocolError> {
        self.send(Some(recipient), payload).await
    }

    async fn send(
        &self,
        recipient: Option<tess_core::MemberId>,
        payload: &KeygenPayload,
    ) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(payload)
            .map_err(|e| ProtocolError::round("keygen", format!("encode failed: {e}")))?;
        let message = ProtocolMessage {
            sender: self.group.this_member().clone(),
            recipient,
            session: self.session.clone(),
            payload,
        };
        self.out
            .send(message)
            .await
            .map_err(|_| ProtocolError::Terminated)
    }
}

fn ack_digest(public_key: &GroupPublicKey) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"TESS_LOCAL_KEYGEN_ACK");
    hasher.update(&public_key.to_bytes());
    *hasher.finalize().as_bytes()
}

/// Horner evaluation of the dealer polynomial at `x`.
fn evaluate(coefficients: &[Scalar], x: u64) -> Scalar {
    let x = Scalar::from(x);
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, c| acc * x + c)
}
