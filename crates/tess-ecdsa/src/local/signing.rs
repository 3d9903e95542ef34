//! Threshold signing for the local suite.
//!
//! The lowest-indexed participant collects `t + 1` Shamir shares,
//! reconstructs the signing scalar by Lagrange interpolation at zero, and
//! broadcasts a recoverable ECDSA signature. Every other participant
//! verifies the broadcast signature against the group public key before
//! accepting it, so a bad reconstruction fails the session instead of
//! reaching the chain.

use crate::error::ProtocolError;
use crate::keyshare::{KeyShare, SignatureTriple};
use crate::local::curve::scalar_from_bytes;
use crate::local::lagrange::interpolate_at_zero;
use crate::local::SigningPayload;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::Scalar;
use std::collections::BTreeMap;
use tess_core::{GroupInfo, ProtocolMessage, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub(super) struct SigningParty {
    group: GroupInfo,
    session: SessionId,
    share: KeyShare,
    digest: [u8; 32],
    out: mpsc::Sender<ProtocolMessage>,
}

impl SigningParty {
    pub(super) fn new(
        group: GroupInfo,
        session: SessionId,
        share: KeyShare,
        digest: [u8; 32],
        out: mpsc::Sender<ProtocolMessage>,
    ) -> Self {
        Self {
            group,
            session,
            share,
            digest,
            out,
        }
    }

    pub(super) async fn run(
        self,
        inbound: mpsc::Receiver<ProtocolMessage>,
    ) -> Result<SignatureTriple, ProtocolError> {
        if self.group.this_member_index() == 0 {
            self.run_collector(inbound).await
        } else {
            self.run_contributor(inbound).await
        }
    }

    /// Contributors hand their share to the collector and wait for the
    /// signature broadcast.
    async fn run_contributor(
        self,
        mut inbound: mpsc::Receiver<ProtocolMessage>,
    ) -> Result<SignatureTriple, ProtocolError> {
        let collector = self.group.members()[0].clone();
        self.send(
            Some(collector),
            &SigningPayload::Partial {
                index: self.share.party_index + 1,
                share: *self.share.secret_share.as_bytes(),
            },
        )
        .await?;

        loop {
            let message = inbound.recv().await.ok_or(ProtocolError::Terminated)?;
            let Some(payload) = self.decode(&message)? else {
                continue;
            };
            match payload {
                SigningPayload::Signature { r, s, recovery_id } => {
                    let triple = SignatureTriple { r, s, recovery_id };
                    self.verify(&triple)?;
                    return Ok(triple);
                }
                SigningPayload::Partial { .. } => {
                    debug!("ignoring partial share addressed to the collector");
                }
            }
        }
    }

    /// The collector reconstructs the signing scalar from the first
    /// `t + 1` shares and signs.
    async fn run_collector(
        self,
        mut inbound: mpsc::Receiver<ProtocolMessage>,
    ) -> Result<SignatureTriple, ProtocolError> {
        let needed = self.share.threshold as usize + 1;
        let mut points: BTreeMap<u16, Scalar> = BTreeMap::new();
        points.insert(
            self.share.party_index + 1,
            scalar_from_bytes(self.share.secret_share.as_bytes())?,
        );

        while points.len() < needed {
            let message = inbound.recv().await.ok_or(ProtocolError::Terminated)?;
            let Some(payload) = self.decode(&message)? else {
                continue;
            };
            match payload {
                SigningPayload::Partial { index, share } => {
                    points.insert(index, scalar_from_bytes(&share)?);
                }
                SigningPayload::Signature { .. } => {
                    warn!("ignoring signature broadcast while collecting shares");
                }
            }
        }

        let points: Vec<(u16, Scalar)> = points.into_iter().collect();
        let secret = interpolate_at_zero(&points[..needed])?;
        let signing_key = SigningKey::from_bytes(&secret.to_bytes())
            .map_err(|e| ProtocolError::key_material(format!("reconstructed key invalid: {e}")))?;
        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(&self.digest)
            .map_err(|e| ProtocolError::round("signing", format!("signing failed: {e}")))?;

        let (r, s) = signature.split_bytes();
        let triple = SignatureTriple {
            r: r.into(),
            s: s.into(),
            recovery_id: recovery_id.to_byte(),
        };
        // Catches a reconstruction that does not match the published key
        // before anything leaves this party.
        self.verify(&triple)?;
        self.send(
            None,
            &SigningPayload::Signature {
                r: triple.r,
                s: triple.s,
                recovery_id: triple.recovery_id,
            },
        )
        .await?;
        Ok(triple)
    }

    /// Recover the public key from the signature and compare it to the
    /// group key.
    fn verify(&self, triple: &SignatureTriple) -> Result<(), ProtocolError> {
        let signature = Signature::from_scalars(triple.r, triple.s)
            .map_err(|e| ProtocolError::round("signing", format!("malformed signature: {e}")))?;
        let recovery_id = RecoveryId::from_byte(triple.recovery_id).ok_or_else(|| {
            ProtocolError::round(
                "signing",
                format!("recovery id {} out of range", triple.recovery_id),
            )
        })?;
        let recovered = VerifyingKey::recover_from_prehash(&self.digest, &signature, recovery_id)
            .map_err(|e| ProtocolError::round("signing", format!("recovery failed: {e}")))?;
        let encoded = recovered.to_encoded_point(false);
        let expected = self.share.public_key.to_bytes();
        if encoded.as_bytes().get(1..) != Some(&expected[..]) {
            return Err(ProtocolError::round(
                "signing",
                "signature does not recover the group public key",
            ));
        }
        Ok(())
    }

    fn decode(&self, message: &ProtocolMessage) -> Result<Option<SigningPayload>, ProtocolError> {
        if message.session != self.session {
            debug!(session = %message.session, "ignoring message from another session");
            return Ok(None);
        }
        if !self.group.is_member(&message.sender) {
            warn!(sender = %message.sender, "ignoring signing message from non-member");
            return Ok(None);
        }
        bincode::deserialize(&message.payload)
            .map(Some)
            .map_err(|e| ProtocolError::round("signing", format!("undecodable payload: {e}")))
    }

    async fn send(
        &self,
        recipient: Option<tess_core::MemberId>,
        payload: &SigningPayload,
    ) -> Result<(), ProtocolError> {
        let payload = bincode::serialize(payload)
            .map_err(|e| ProtocolError::round("signing", format!("encode failed: {e}")))?;
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
