//! Dealer-based local protocol suite.
//!
//! A deterministic stand-in for a real GG19 implementation: it produces
//! genuine secp256k1 keys and recoverable signatures and exchanges its
//! rounds over the same mailboxes a production suite would, but the dealer
//! briefly reconstructs key material, so it provides no threshold security.
//! It backs `start-local` and the test suites only.

mod curve;
mod keygen;
mod lagrange;
mod signing;

use crate::error::ProtocolError;
use crate::keyshare::{KeyShare, SignatureTriple};
use crate::party::{ProtocolSuite, RunningParty};
use crate::preparams::PreParams;
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tess_core::{GroupInfo, SessionId};
use tokio::sync::{mpsc, oneshot};

const MAILBOX: usize = 64;

/// Key-generation round payloads.
#[derive(Debug, Serialize, Deserialize)]
enum KeygenPayload {
    /// Entropy commitment, broadcast by every party.
    Commit {
        /// Hash commitment over the sender's pre-parameters.
        commitment: [u8; 32],
    },
    /// One member's Shamir share, unicast by the dealer.
    Share {
        /// Share scalar, big-endian.
        share: [u8; 32],
    },
    /// The group public key, broadcast by the dealer.
    PublicKey {
        /// X coordinate.
        x: [u8; 32],
        /// Y coordinate.
        y: [u8; 32],
    },
    /// Acknowledgement of the dealt key, broadcast by every party.
    Ack {
        /// Digest binding the acknowledged public key.
        digest: [u8; 32],
    },
}

/// Signing round payloads.
#[derive(Debug, Serialize, Deserialize)]
enum SigningPayload {
    /// A participant's share, unicast to the collector.
    Partial {
        /// 1-based evaluation point of the share.
        index: u16,
        /// Share scalar, big-endian.
        share: [u8; 32],
    },
    /// The finished signature, broadcast by the collector.
    Signature {
        /// ECDSA `r`.
        r: [u8; 32],
        /// ECDSA `s`.
        s: [u8; 32],
        /// Raw recovery id.
        recovery_id: u8,
    },
}

/// The local dealer-based [`ProtocolSuite`].
#[derive(Debug, Default, Clone)]
pub struct LocalSuite;

impl LocalSuite {
    /// Create the suite.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolSuite for LocalSuite {
    async fn generate_pre_params(&self) -> Result<PreParams, ProtocolError> {
        let mut entropy = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut entropy);
        Ok(PreParams::new(entropy))
    }

    fn start_keygen(
        &self,
        group: &GroupInfo,
        session: &SessionId,
        pre_params: PreParams,
    ) -> Result<RunningParty<KeyShare>, ProtocolError> {
        let (in_tx, in_rx) = mpsc::channel(MAILBOX);
        let (out_tx, out_rx) = mpsc::channel(MAILBOX);
        let (done_tx, done_rx) = oneshot::channel();
        let party = keygen::KeygenParty::new(group.clone(), session.clone(), pre_params, out_tx);
        tokio::spawn(async move {
            let _ = done_tx.send(party.run(in_rx).await);
        });
        Ok(RunningParty {
            inbound: in_tx,
            outbound: out_rx,
            done: done_rx,
        })
    }

    fn start_signing(
        &self,
        group: &GroupInfo,
        session: &SessionId,
        share: &KeyShare,
        digest: [u8; 32],
    ) -> Result<RunningParty<SignatureTriple>, ProtocolError> {
        let (in_tx, in_rx) = mpsc::channel(MAILBOX);
        let (out_tx, out_rx) = mpsc::channel(MAILBOX);
        let (done_tx, done_rx) = oneshot::channel();
        let party = signing::SigningParty::new(
            group.clone(),
            session.clone(),
            share.clone(),
            digest,
            out_tx,
        );
        tokio::spawn(async move {
            let _ = done_tx.send(party.run(in_rx).await);
        });
        Ok(RunningParty {
            inbound: in_tx,
            outbound: out_rx,
            done: done_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use tess_core::{KeepId, MemberId, ProtocolMessage};

    fn group_of(n: u8, this: u8, threshold: usize) -> GroupInfo {
        let members: Vec<MemberId> = (1..=n)
            .map(|b| MemberId::from_bytes(vec![b]).expect("member id"))
            .collect();
        GroupInfo::new(
            KeepId::new("0x0101"),
            MemberId::from_bytes(vec![this]).expect("member id"),
            members,
            threshold,
        )
        .expect("group")
    }

    /// Deliver every outbound message to the right inbound mailboxes until
    /// all parties resolve.
    async fn run_to_completion<O: Send + 'static>(
        mut parties: Vec<RunningParty<O>>,
        group_of_index: impl Fn(usize) -> GroupInfo,
    ) -> Vec<O> {
        let inbounds: Vec<_> = parties.iter().map(|p| p.inbound.clone()).collect();
        let groups: Vec<_> = (0..parties.len()).map(group_of_index).collect();

        let mut routers = Vec::new();
        for (index, party) in parties.iter_mut().enumerate() {
            let mut outbound =
                std::mem::replace(&mut party.outbound, mpsc::channel(1).1);
            let inbounds = inbounds.clone();
            let group = groups[index].clone();
            routers.push(tokio::spawn(async move {
                while let Some(message) = outbound.recv().await {
                    route(&group, &message, &inbounds).await;
                }
            }));
        }

        let mut outputs = Vec::new();
        for party in parties {
            let outcome = party.done.await.expect("party resolved");
            outputs.push(outcome.expect("party succeeded"));
        }
        for router in routers {
            router.abort();
        }
        outputs
    }

    async fn route(
        group: &GroupInfo,
        message: &ProtocolMessage,
        inbounds: &[mpsc::Sender<ProtocolMessage>],
    ) {
        match &message.recipient {
            Some(recipient) => {
                let index = group.member_index(recipient).expect("recipient index");
                let _ = inbounds[index].send(message.clone()).await;
            }
            None => {
                let sender = group.member_index(&message.sender).expect("sender index");
                for (index, inbound) in inbounds.iter().enumerate() {
                    if index != sender {
                        let _ = inbound.send(message.clone()).await;
                    }
                }
            }
        }
    }

    async fn keygen_all(n: u8, threshold: usize) -> Vec<KeyShare> {
        let suite = LocalSuite::new();
        let session = SessionId::for_keygen(&KeepId::new("0x0101"));
        let parties: Vec<_> = (1..=n)
            .map(|this| {
                let group = group_of(n, this, threshold);
                let pre_params = PreParams::new([this; 32]);
                suite
                    .start_keygen(&group, &session, pre_params)
                    .expect("keygen starts")
            })
            .collect();
        run_to_completion(parties, |i| group_of(n, (i + 1) as u8, threshold)).await
    }

    #[tokio::test]
    async fn three_party_keygen_agrees_on_one_key() {
        let shares = keygen_all(3, 1).await;
        assert_eq!(shares[0].public_key, shares[1].public_key);
        assert_eq!(shares[1].public_key, shares[2].public_key);
        assert_ne!(shares[0].secret_share, shares[1].secret_share);
    }

    #[tokio::test]
    async fn signing_produces_a_recoverable_signature() {
        let shares = keygen_all(3, 1).await;
        let digest = [0x01u8; 32];
        let keep = KeepId::new("0x0101");
        let session = SessionId::for_signing(&keep, &digest);
        let suite = LocalSuite::new();

        let parties: Vec<_> = shares
            .iter()
            .enumerate()
            .map(|(i, share)| {
                let group = group_of(3, (i + 1) as u8, 1);
                suite
                    .start_signing(&group, &session, share, digest)
                    .expect("signing starts")
            })
            .collect();
        let triples = run_to_completion(parties, |i| group_of(3, (i + 1) as u8, 1)).await;

        for triple in &triples {
            assert_eq!(triple, &triples[0]);
            assert!(triple.recovery_id <= 3);
        }

        let triple = triples[0];
        let signature = Signature::from_scalars(triple.r, triple.s).expect("signature");
        let recovery_id = RecoveryId::from_byte(triple.recovery_id).expect("recovery id");
        let recovered = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
            .expect("recovery");
        let encoded = recovered.to_encoded_point(false);
        assert_eq!(
            encoded.as_bytes()[1..],
            shares[0].public_key.to_bytes()[..]
        );
    }

    #[tokio::test]
    async fn single_member_group_completes_alone() {
        let shares = keygen_all(1, 0).await;
        assert_eq!(shares.len(), 1);
    }
}
