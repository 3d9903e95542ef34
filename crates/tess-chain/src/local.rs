//! In-memory chain for `start-local` and tests.
//!
//! Mirrors the contract of a live ledger: keeps are created against it,
//! public keys and signatures are submitted to it, and it notifies
//! subscribers of keep lifecycle events. Blocks are mined explicitly (or by
//! the auto-miner in local mode).

use crate::block_counter::{BlockCounter, NewHeadsSource};
use crate::error::ChainError;
use crate::events::{Address, ChainSignature, KeepClosed, KeepCreated, SignatureRequested};
use crate::ChainHandle;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tess_core::{KeepId, MemberId};
use tokio::sync::mpsc;
use tracing::{debug, info};

const EVENT_BUFFER: usize = 32;

#[derive(Debug)]
struct KeepRecord {
    members: Vec<MemberId>,
    dishonest_threshold: usize,
    application: Address,
    public_key: Option<[u8; 64]>,
    active_request: Option<[u8; 32]>,
    signatures: Vec<([u8; 32], ChainSignature)>,
    closed: bool,
    signature_subs: Vec<mpsc::Sender<SignatureRequested>>,
    closed_subs: Vec<mpsc::Sender<KeepClosed>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    Transient,
    Permanent,
}

struct LocalState {
    keeps: HashMap<KeepId, KeepRecord>,
    keep_created_subs: Vec<mpsc::Sender<KeepCreated>>,
    injected_failures: Vec<FailureMode>,
}

struct LocalInner {
    operator: Address,
    state: Mutex<LocalState>,
    heads_tx: mpsc::Sender<u64>,
    height: Mutex<u64>,
    counter: BlockCounter,
}

/// In-memory [`ChainHandle`] implementation.
///
/// Clones share state, so a test can hand one clone to the operator under
/// test and drive events through another.
#[derive(Clone)]
pub struct LocalChain {
    inner: Arc<LocalInner>,
}

struct LocalHeads {
    rx: Mutex<Option<mpsc::Receiver<u64>>>,
}

#[async_trait]
impl NewHeadsSource for LocalHeads {
    async fn subscribe(&self) -> Result<mpsc::Receiver<u64>, ChainError> {
        self.rx.lock().take().ok_or(ChainError::SubscriptionClosed)
    }
}

impl LocalChain {
    /// Create a local chain for the given operator identity.
    pub fn new(operator: Address) -> Self {
        let (heads_tx, heads_rx) = mpsc::channel(EVENT_BUFFER);
        let counter = BlockCounter::start(
            Arc::new(LocalHeads {
                rx: Mutex::new(Some(heads_rx)),
            }),
            0,
        );
        Self {
            inner: Arc::new(LocalInner {
                operator,
                state: Mutex::new(LocalState {
                    keeps: HashMap::new(),
                    keep_created_subs: Vec::new(),
                    injected_failures: Vec::new(),
                }),
                heads_tx,
                height: Mutex::new(0),
                counter,
            }),
        }
    }

    /// Spawn a miner producing a block every `interval` until the chain is
    /// dropped. Used by `start-local`.
    pub fn start_miner(&self, interval: Duration) {
        let chain = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = chain.upgrade() else {
                    return;
                };
                let height = {
                    let mut height = inner.height.lock();
                    *height += 1;
                    *height
                };
                if inner.heads_tx.send(height).await.is_err() {
                    return;
                }
            }
        });
    }

    /// Mine a single block.
    pub async fn mine_block(&self) {
        let height = {
            let mut height = self.inner.height.lock();
            *height += 1;
            *height
        };
        let _ = self.inner.heads_tx.send(height).await;
    }

    /// Open a keep with the given membership; notifies subscribers.
    pub async fn create_keep(
        &self,
        keep_id: KeepId,
        members: Vec<MemberId>,
        dishonest_threshold: usize,
        application: Address,
    ) {
        let (event, subs) = {
            let mut state = self.inner.state.lock();
            state.keeps.insert(
                keep_id.clone(),
                KeepRecord {
                    members: members.clone(),
                    dishonest_threshold,
                    application,
                    public_key: None,
                    active_request: None,
                    signatures: Vec::new(),
                    closed: false,
                    signature_subs: Vec::new(),
                    closed_subs: Vec::new(),
                },
            );
            state.keep_created_subs.retain(|s| !s.is_closed());
            (
                KeepCreated {
                    keep_id,
                    members,
                    dishonest_threshold,
                    application,
                },
                state.keep_created_subs.clone(),
            )
        };
        info!(keep = %event.keep_id, members = event.members.len(), "keep created");
        for sub in subs {
            let _ = sub.send(event.clone()).await;
        }
    }

    /// Request a signature over `digest` from a keep's group.
    pub async fn request_signature(
        &self,
        keep_id: &KeepId,
        digest: [u8; 32],
    ) -> Result<(), ChainError> {
        let subs = {
            let mut state = self.inner.state.lock();
            let record = state
                .keeps
                .get_mut(keep_id)
                .ok_or_else(|| ChainError::UnknownKeep {
                    address: keep_id.clone(),
                })?;
            record.active_request = Some(digest);
            record.signature_subs.retain(|s| !s.is_closed());
            record.signature_subs.clone()
        };
        debug!(keep = %keep_id, digest = %hex::encode(digest), "signature requested");
        for sub in subs {
            let _ = sub.send(SignatureRequested { digest }).await;
        }
        Ok(())
    }

    /// Close a keep; notifies subscribers.
    pub async fn close_keep(&self, keep_id: &KeepId) -> Result<(), ChainError> {
        let subs = {
            let mut state = self.inner.state.lock();
            let record = state
                .keeps
                .get_mut(keep_id)
                .ok_or_else(|| ChainError::UnknownKeep {
                    address: keep_id.clone(),
                })?;
            record.closed = true;
            record.closed_subs.retain(|s| !s.is_closed());
            record.closed_subs.clone()
        };
        info!(keep = %keep_id, "keep closed");
        for sub in subs {
            let _ = sub.send(KeepClosed).await;
        }
        Ok(())
    }

    /// Make the next `count` submissions fail. Transient failures are
    /// retryable; permanent ones are not.
    pub fn inject_submit_failures(&self, count: usize, permanent: bool) {
        let mode = if permanent {
            FailureMode::Permanent
        } else {
            FailureMode::Transient
        };
        self.inner
            .state
            .lock()
            .injected_failures
            .extend(std::iter::repeat(mode).take(count));
    }

    /// The public key submitted for a keep, if any.
    pub fn submitted_public_key(&self, keep_id: &KeepId) -> Option<[u8; 64]> {
        self.inner
            .state
            .lock()
            .keeps
            .get(keep_id)
            .and_then(|r| r.public_key)
    }

    /// Signatures submitted for a keep.
    pub fn submitted_signatures(&self, keep_id: &KeepId) -> Vec<([u8; 32], ChainSignature)> {
        self.inner
            .state
            .lock()
            .keeps
            .get(keep_id)
            .map(|r| r.signatures.clone())
            .unwrap_or_default()
    }

    fn take_injected_failure(&self) -> Option<ChainError> {
        let mut state = self.inner.state.lock();
        if state.injected_failures.is_empty() {
            return None;
        }
        match state.injected_failures.remove(0) {
            FailureMode::Transient => Some(ChainError::connection("injected transient failure")),
            FailureMode::Permanent => Some(ChainError::rejected("injected permanent failure")),
        }
    }
}

#[async_trait]
impl ChainHandle for LocalChain {
    fn operator_address(&self) -> Address {
        self.inner.operator
    }

    async fn on_keep_created(&self) -> Result<mpsc::Receiver<KeepCreated>, ChainError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.inner.state.lock().keep_created_subs.push(tx);
        Ok(rx)
    }

    async fn on_signature_requested(
        &self,
        keep: &KeepId,
    ) -> Result<mpsc::Receiver<SignatureRequested>, ChainError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut state = self.inner.state.lock();
        let record = state
            .keeps
            .get_mut(keep)
            .ok_or_else(|| ChainError::UnknownKeep {
                address: keep.clone(),
            })?;
        record.signature_subs.push(tx);
        Ok(rx)
    }

    async fn on_keep_closed(
        &self,
        keep: &KeepId,
    ) -> Result<mpsc::Receiver<KeepClosed>, ChainError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut state = self.inner.state.lock();
        let record = state
            .keeps
            .get_mut(keep)
            .ok_or_else(|| ChainError::UnknownKeep {
                address: keep.clone(),
            })?;
        record.closed_subs.push(tx);
        Ok(rx)
    }

    async fn submit_public_key(
        &self,
        keep: &KeepId,
        public_key: [u8; 64],
    ) -> Result<(), ChainError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let mut state = self.inner.state.lock();
        let record = state
            .keeps
            .get_mut(keep)
            .ok_or_else(|| ChainError::UnknownKeep {
                address: keep.clone(),
            })?;
        match record.public_key {
            Some(existing) if existing != public_key => Err(ChainError::rejected(format!(
                "conflicting public key already submitted for keep {keep}"
            ))),
            _ => {
                record.public_key = Some(public_key);
                Ok(())
            }
        }
    }

    async fn submit_signature(
        &self,
        keep: &KeepId,
        digest: [u8; 32],
        signature: ChainSignature,
    ) -> Result<(), ChainError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let mut state = self.inner.state.lock();
        let record = state
            .keeps
            .get_mut(keep)
            .ok_or_else(|| ChainError::UnknownKeep {
                address: keep.clone(),
            })?;
        record.signatures.push((digest, signature));
        record.active_request = None;
        Ok(())
    }

    fn block_counter(&self) -> BlockCounter {
        self.inner.counter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(byte: u8) -> MemberId {
        MemberId::from_bytes(vec![byte]).expect("member id")
    }

    fn application() -> Address {
        Address([0xAA; 20])
    }

    #[tokio::test]
    async fn keep_created_events_reach_subscribers() {
        let chain = LocalChain::new(Address([1; 20]));
        let mut events = chain.on_keep_created().await.expect("subscribe");
        chain
            .create_keep(KeepId::new("0x01"), vec![member(1), member(2)], 1, application())
            .await;
        let event = events.recv().await.expect("event");
        assert_eq!(event.keep_id, KeepId::new("0x01"));
        assert_eq!(event.members.len(), 2);
    }

    #[tokio::test]
    async fn signature_request_for_unknown_keep_fails() {
        let chain = LocalChain::new(Address([1; 20]));
        let err = chain
            .request_signature(&KeepId::new("0x0000000000000000000000000000000000000001"), [1; 32])
            .await
            .expect_err("unknown keep");
        assert_eq!(
            err.to_string(),
            "failed to find keep with address: [0x0000000000000000000000000000000000000001]"
        );
    }

    #[tokio::test]
    async fn conflicting_public_keys_are_rejected() {
        let chain = LocalChain::new(Address([1; 20]));
        let keep = KeepId::new("0x02");
        chain
            .create_keep(keep.clone(), vec![member(1)], 0, application())
            .await;
        chain
            .submit_public_key(&keep, [1; 64])
            .await
            .expect("first submission");
        chain
            .submit_public_key(&keep, [1; 64])
            .await
            .expect("idempotent resubmission");
        let err = chain
            .submit_public_key(&keep, [2; 64])
            .await
            .expect_err("conflict");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn mined_blocks_drive_the_counter() {
        let chain = LocalChain::new(Address([1; 20]));
        let counter = chain.block_counter();
        chain.mine_block().await;
        chain.mine_block().await;
        counter.wait_for_block_height(2).await;
        assert_eq!(counter.current_height(), 2);
    }
}
