//! End-to-end DKG and signing sessions over the in-memory network.
#![allow(missing_docs)]

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;
use std::time::Duration;
use tess_core::{CancelHandle, CancelToken, GroupInfo, KeepId, MemberId};
use tess_ecdsa::{KeyShare, LocalSuite, PreParams};
use tess_engine::{SessionConfig, SessionError, TssEngine};
use tess_network::inmem::InMemoryNetwork;

fn member(byte: u8) -> MemberId {
    MemberId::from_bytes(vec![byte]).expect("member id")
}

fn group(this: u8, members: &[u8], threshold: usize) -> GroupInfo {
    GroupInfo::new(
        KeepId::new("0x0101"),
        member(this),
        members.iter().map(|&b| member(b)).collect(),
        threshold,
    )
    .expect("group")
}

fn engine(network: &InMemoryNetwork, this: u8, config: SessionConfig) -> TssEngine {
    let provider = Arc::new(network.join(vec![this]));
    TssEngine::with_config(Arc::new(LocalSuite::new()), provider, config)
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        ready_timeout: Duration::from_secs(5),
        ready_announce_interval: Duration::from_millis(20),
    }
}

async fn run_three_party_keygen(network: &InMemoryNetwork) -> Vec<KeyShare> {
    let mut runs = Vec::new();
    for this in [1u8, 2, 3] {
        let engine = engine(network, this, fast_config());
        let group = group(this, &[1, 2, 3], 1);
        runs.push(tokio::spawn(async move {
            engine
                .run_keygen(&group, PreParams::new([this; 32]), CancelToken::never())
                .await
        }));
    }
    let mut shares = Vec::new();
    for run in runs {
        shares.push(run.await.expect("join").expect("keygen"));
    }
    shares
}

#[tokio::test]
async fn three_party_dkg_and_signing_verify_by_recovery() {
    let network = InMemoryNetwork::new();
    let shares = run_three_party_keygen(&network).await;

    let public_key = shares[0].public_key.to_bytes();
    for share in &shares {
        assert_eq!(share.public_key.to_bytes(), public_key);
    }

    // Sign the all-ones digest and check the signature recovers the group
    // key.
    let digest = [0x01u8; 32];
    let mut runs = Vec::new();
    for (i, share) in shares.iter().cloned().enumerate() {
        let engine = engine(&network, (i + 1) as u8, fast_config());
        let group = group((i + 1) as u8, &[1, 2, 3], 1);
        runs.push(tokio::spawn(async move {
            engine
                .run_signing(&group, &share, digest, CancelToken::never())
                .await
        }));
    }
    let mut triples = Vec::new();
    for run in runs {
        triples.push(run.await.expect("join").expect("signing"));
    }

    for triple in &triples {
        assert_eq!(triple, &triples[0]);
        assert!(triple.recovery_id <= 3);
    }

    let triple = triples[0];
    let signature = Signature::from_scalars(triple.r, triple.s).expect("signature");
    let recovery_id = RecoveryId::from_byte(triple.recovery_id).expect("recovery id");
    let recovered =
        VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id).expect("recover");
    assert_eq!(
        recovered.to_encoded_point(false).as_bytes()[1..],
        public_key[..]
    );
}

#[tokio::test]
async fn absent_member_fails_the_readiness_barrier_for_everyone() {
    let network = InMemoryNetwork::new();
    // Member 3 exists on the network but never opens a session.
    network.join(vec![3]);

    let config = SessionConfig {
        ready_timeout: Duration::from_millis(300),
        ready_announce_interval: Duration::from_millis(20),
    };
    let mut runs = Vec::new();
    for this in [1u8, 2] {
        let engine = engine(&network, this, config.clone());
        let group = group(this, &[1, 2, 3], 1);
        runs.push(tokio::spawn(async move {
            engine
                .run_keygen(&group, PreParams::new([this; 32]), CancelToken::never())
                .await
        }));
    }
    for run in runs {
        let err = run.await.expect("join").expect_err("barrier must expire");
        assert!(matches!(err, SessionError::ReadyTimeout { .. }));
    }
}

#[tokio::test]
async fn cancellation_fails_the_session_with_a_distinguishable_reason() {
    let network = InMemoryNetwork::new();
    network.join(vec![2]);
    network.join(vec![3]);
    let engine = engine(&network, 1, fast_config());
    let group = group(1, &[1, 2, 3], 1);

    let (handle, token) = CancelHandle::new();
    let run = tokio::spawn(async move {
        engine
            .run_keygen(&group, PreParams::new([1; 32]), token)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let err = run.await.expect("join").expect_err("cancelled");
    assert!(err.is_cancellation());
}
