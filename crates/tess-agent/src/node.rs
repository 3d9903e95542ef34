//! Keep lifecycle manager.
//!
//! One [`OperatorNode`] per process. It subscribes to keep-creation events,
//! runs a DKG session for every keep whose member list includes this
//! operator, persists the signer before the public key leaves the process,
//! and serves signature requests per keep until the keep closes. Each keep
//! runs in its own task; a failed keep never takes down the node.

use crate::store::SignerStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tess_chain::{Address, ChainError, ChainHandle, ChainSignature, KeepCreated};
use tess_core::{Backoff, CancelToken, GroupInfo, KeepId, MemberId};
use tess_ecdsa::Signer;
use tess_engine::{PreParamsPool, SessionError, TssEngine};
use tess_network::NetworkProvider;
use tracing::{debug, error, info, warn};

/// Lifecycle-manager tunables.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Attempts before a chain submission is permanently failed.
    pub submit_attempts: usize,
    /// First delay of the submission retry backoff.
    pub submit_backoff_initial: Duration,
    /// Ceiling of the submission retry backoff.
    pub submit_backoff_max: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            submit_attempts: tess_core::defaults::CHAIN_SUBMIT_ATTEMPTS,
            submit_backoff_initial: tess_core::defaults::CHAIN_BACKOFF_INITIAL,
            submit_backoff_max: tess_core::defaults::CHAIN_BACKOFF_MAX,
        }
    }
}

/// Fatal node-level errors. Per-keep failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The chain subscription the node lives on could not be established.
    #[error("chain subscription failed: {0}")]
    Chain(#[from] ChainError),

    /// The operator's network identity is unusable as a member id.
    #[error("operator identity invalid: {0}")]
    Identity(#[from] tess_core::MemberIdError),
}

/// Where a keep stands from this operator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepStatus {
    /// DKG is running.
    Generating,
    /// A signer is held and signature requests are served.
    Active,
    /// The signer exists off-chain but the chain could not be told, or the
    /// signer could not be persisted. Operator intervention is required.
    Stuck,
}

struct KeepState {
    status: KeepStatus,
    signing: Arc<AtomicBool>,
}

/// The keep lifecycle manager.
pub struct OperatorNode {
    chain: Arc<dyn ChainHandle>,
    engine: Arc<TssEngine>,
    store: Arc<SignerStore>,
    pool: Arc<PreParamsPool>,
    sanctioned: Vec<Address>,
    member_id: MemberId,
    config: NodeConfig,
    keeps: Mutex<HashMap<KeepId, KeepState>>,
}

impl OperatorNode {
    /// Assemble a node. `sanctioned` is the application allow-list; an
    /// empty list serves every application.
    pub fn new(
        chain: Arc<dyn ChainHandle>,
        provider: Arc<dyn NetworkProvider>,
        engine: Arc<TssEngine>,
        store: Arc<SignerStore>,
        pool: Arc<PreParamsPool>,
        sanctioned: Vec<Address>,
        config: NodeConfig,
    ) -> Result<Arc<Self>, AgentError> {
        let member_id = provider.local_peer().member_id()?;
        Ok(Arc::new(Self {
            chain,
            engine,
            store,
            pool,
            sanctioned,
            member_id,
            config,
            keeps: Mutex::new(HashMap::new()),
        }))
    }

    /// The member id this node participates under.
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Status of one keep, if this node tracks it.
    pub fn keep_status(&self, keep: &KeepId) -> Option<KeepStatus> {
        self.keeps.lock().get(keep).map(|state| state.status)
    }

    /// Keeps needing operator intervention.
    pub fn stuck_keeps(&self) -> Vec<KeepId> {
        self.keeps
            .lock()
            .iter()
            .filter(|(_, state)| state.status == KeepStatus::Stuck)
            .map(|(keep, _)| keep.clone())
            .collect()
    }

    /// Run until cancelled. Re-registers handlers for persisted signers,
    /// then serves keep-creation events.
    pub async fn run(self: Arc<Self>, cancel: CancelToken) -> Result<(), AgentError> {
        self.restore_persisted_keeps(&cancel).await;

        let mut events = self.chain.on_keep_created().await?;
        info!(
            member = %self.member_id,
            operator = %self.chain.operator_address(),
            "operator node running"
        );

        let mut cancelled = cancel.clone();
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    info!("operator node shutting down");
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(AgentError::Chain(ChainError::SubscriptionClosed));
                    };
                    self.clone().handle_keep_created(event, cancel.clone());
                }
            }
        }
    }

    /// Survive restarts: every persisted signer gets its handlers back.
    async fn restore_persisted_keeps(self: &Arc<Self>, cancel: &CancelToken) {
        let signers = match self.store.load_all().await {
            Ok(signers) => signers,
            Err(e) => {
                warn!(error = %e, "signer store scan failed; continuing without restores");
                return;
            }
        };
        for signer in signers {
            let keep = signer.group.keep_id().clone();
            info!(keep = %keep, "restoring persisted signer");
            self.track(&keep, KeepStatus::Active);
            self.clone().serve_keep(Arc::new(signer), cancel.clone());
        }
    }

    fn handle_keep_created(self: Arc<Self>, event: KeepCreated, cancel: CancelToken) {
        if !event.members.contains(&self.member_id) {
            debug!(keep = %event.keep_id, "ignoring keep for other operators");
            return;
        }
        if !self.sanctioned.is_empty() && !self.sanctioned.contains(&event.application) {
            debug!(
                keep = %event.keep_id,
                application = %event.application,
                "ignoring keep from unsanctioned application"
            );
            return;
        }
        if self.keeps.lock().contains_key(&event.keep_id) {
            debug!(keep = %event.keep_id, "ignoring duplicate keep-created event");
            return;
        }
        self.track(&event.keep_id, KeepStatus::Generating);

        tokio::spawn(async move {
            if let Err(e) = self.clone().establish_keep(event, cancel).await {
                if !e.is_cancellation() {
                    error!(error = %e, "keep establishment failed");
                }
            }
        });
    }

    /// DKG, durable persistence, then publication. Order matters: the
    /// signer must be on disk before the chain learns the public key.
    async fn establish_keep(
        self: Arc<Self>,
        event: KeepCreated,
        cancel: CancelToken,
    ) -> Result<(), SessionError> {
        let keep = event.keep_id.clone();
        let group = match GroupInfo::new(
            keep.clone(),
            self.member_id.clone(),
            event.members,
            event.dishonest_threshold,
        ) {
            Ok(group) => group,
            Err(e) => {
                self.untrack(&keep);
                return Err(SessionError::Group(e));
            }
        };

        let pre_params = match self.pool.take().await {
            Ok(pre_params) => pre_params,
            Err(e) => {
                self.untrack(&keep);
                return Err(SessionError::Protocol(e));
            }
        };
        info!(keep = %keep, members = group.members().len(), "starting key generation");
        let share = match self
            .engine
            .run_keygen(&group, pre_params, cancel.clone())
            .await
        {
            Ok(share) => share,
            Err(e) => {
                self.untrack(&keep);
                return Err(e);
            }
        };

        let signer = Signer { group, share };
        if let Err(e) = self.store.save(&signer).await {
            // Publishing an unpersisted key would strand the group on a
            // share nobody can recover; the keep is stuck instead.
            error!(keep = %keep, error = %e, "failed to persist signer; keep is stuck");
            self.track(&keep, KeepStatus::Stuck);
            return Ok(());
        }

        let public_key = signer.share.public_key.to_bytes();
        let submitted = self
            .retry_submit(|| {
                let chain = self.chain.clone();
                let keep = keep.clone();
                async move { chain.submit_public_key(&keep, public_key).await }
            })
            .await;
        if let Err(e) = submitted {
            error!(
                keep = %keep,
                error = %e,
                "public key submission permanently failed; keep is stuck, operator intervention required"
            );
            self.track(&keep, KeepStatus::Stuck);
            return Ok(());
        }
        info!(keep = %keep, key = %signer.share.public_key, "public key published");

        self.track(&keep, KeepStatus::Active);
        self.serve_keep(Arc::new(signer), cancel);
        Ok(())
    }

    /// Register signature-request and close handlers for one held signer.
    fn serve_keep(self: Arc<Self>, signer: Arc<Signer>, cancel: CancelToken) {
        tokio::spawn(async move {
            let keep = signer.group.keep_id().clone();
            let mut requests = match self.chain.on_signature_requested(&keep).await {
                Ok(requests) => requests,
                Err(e) => {
                    warn!(keep = %keep, error = %e, "cannot subscribe to signature requests");
                    return;
                }
            };
            let mut closed = match self.chain.on_keep_closed(&keep).await {
                Ok(closed) => closed,
                Err(e) => {
                    warn!(keep = %keep, error = %e, "cannot subscribe to keep closure");
                    return;
                }
            };
            let signing = self
                .keeps
                .lock()
                .get(&keep)
                .map(|state| state.signing.clone())
                .unwrap_or_default();

            let mut cancelled = cancel.clone();
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => return,
                    request = requests.recv() => {
                        let Some(request) = request else {
                            warn!(keep = %keep, "signature request subscription ended");
                            return;
                        };
                        if signing.swap(true, Ordering::SeqCst) {
                            debug!(keep = %keep, "ignoring signature request; session in progress");
                            continue;
                        }
                        let node = self.clone();
                        let signer = signer.clone();
                        let signing = signing.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            node.sign_and_submit(&signer, request.digest, cancel).await;
                            signing.store(false, Ordering::SeqCst);
                        });
                    }
                    event = closed.recv() => {
                        if event.is_some() {
                            info!(keep = %keep, "keep closed on-chain, archiving signer");
                            if let Err(e) = self.store.archive(&keep).await {
                                warn!(keep = %keep, error = %e, "failed to archive signer");
                            }
                            self.untrack(&keep);
                        }
                        return;
                    }
                }
            }
        });
    }

    /// One signing session plus chain submission.
    async fn sign_and_submit(&self, signer: &Signer, digest: [u8; 32], cancel: CancelToken) {
        let keep = signer.group.keep_id();
        info!(keep = %keep, digest = %hex::encode(digest), "starting signing session");
        let triple = match self
            .engine
            .run_signing(&signer.group, &signer.share, digest, cancel)
            .await
        {
            Ok(triple) => triple,
            Err(e) if e.is_cancellation() => {
                info!(keep = %keep, "signing session cancelled");
                return;
            }
            Err(e) => {
                error!(keep = %keep, error = %e, "signing session failed");
                return;
            }
        };

        // The chain wants the legacy convention; the engine's output stays
        // raw.
        let signature = ChainSignature {
            r: triple.r,
            s: triple.s,
            v: triple.recovery_id + 27,
        };
        let submitted = self
            .retry_submit(|| {
                let chain = self.chain.clone();
                let keep = keep.clone();
                async move { chain.submit_signature(&keep, digest, signature).await }
            })
            .await;
        match submitted {
            Ok(()) => info!(keep = %keep, "signature submitted"),
            Err(e) => {
                error!(
                    keep = %keep,
                    error = %e,
                    "signature submission permanently failed; keep is stuck, operator intervention required"
                );
                self.track(keep, KeepStatus::Stuck);
            }
        }
    }

    /// Bounded-backoff retry for chain submissions; permanent errors stop
    /// immediately.
    async fn retry_submit<F, Fut>(&self, mut attempt: F) -> Result<(), ChainError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), ChainError>>,
    {
        let mut backoff = Backoff::new(
            self.config.submit_backoff_initial,
            self.config.submit_backoff_max,
        );
        let counter = self.chain.block_counter();
        let mut last = None;
        for tries in 0..self.config.submit_attempts {
            match attempt().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    let delay = backoff.next_delay();
                    warn!(error = %e, tries, retry_in = ?delay, "chain submission failed, retrying");
                    // Chain progress is as good a retry signal as the
                    // backoff clock; take whichever comes first.
                    let next_block = counter.current_height() + 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = counter.wait_for_block_height(next_block) => {}
                    }
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or(ChainError::SubscriptionClosed))
    }

    fn track(&self, keep: &KeepId, status: KeepStatus) {
        let mut keeps = self.keeps.lock();
        let state = keeps.entry(keep.clone()).or_insert_with(|| KeepState {
            status,
            signing: Arc::new(AtomicBool::new(false)),
        });
        state.status = status;
    }

    fn untrack(&self, keep: &KeepId) {
        self.keeps.lock().remove(keep);
    }
}
