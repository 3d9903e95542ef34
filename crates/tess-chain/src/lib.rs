//! # Tess Chain
//!
//! The operator node's view of the coordinating ledger: an abstract
//! [`ChainHandle`] facade, the block counter that turns new-head
//! notifications into height waits and watch streams, and an in-memory
//! [`local::LocalChain`] used by `start-local` and tests.
//!
//! Live ledger backends implement [`ChainHandle`] outside this workspace;
//! the core consumes nothing beyond this trait.

pub mod block_counter;
pub mod error;
pub mod events;
pub mod local;

use async_trait::async_trait;
use tess_core::KeepId;
use tokio::sync::mpsc;

pub use block_counter::{BlockCounter, BlockWatcher, NewHeadsSource};
pub use error::ChainError;
pub use events::{Address, ChainSignature, KeepClosed, KeepCreated, SignatureRequested};

/// Abstract interface to the coordinating ledger.
///
/// Subscriptions hand back receivers; the implementation owns the delivery
/// tasks. Dropping a receiver ends the subscription.
#[async_trait]
pub trait ChainHandle: Send + Sync {
    /// The operator's chain-level identity.
    fn operator_address(&self) -> Address;

    /// Subscribe to keep-creation events.
    async fn on_keep_created(&self) -> Result<mpsc::Receiver<KeepCreated>, ChainError>;

    /// Subscribe to signature-requested events for one keep.
    async fn on_signature_requested(
        &self,
        keep: &KeepId,
    ) -> Result<mpsc::Receiver<SignatureRequested>, ChainError>;

    /// Subscribe to the closing of one keep.
    async fn on_keep_closed(&self, keep: &KeepId)
        -> Result<mpsc::Receiver<KeepClosed>, ChainError>;

    /// Publish a keep's group public key (64 bytes, X ‖ Y).
    async fn submit_public_key(&self, keep: &KeepId, public_key: [u8; 64])
        -> Result<(), ChainError>;

    /// Submit a signature for a requested digest. `signature.v` already
    /// carries the chain convention (`recovery_id + 27`).
    async fn submit_signature(
        &self,
        keep: &KeepId,
        digest: [u8; 32],
        signature: ChainSignature,
    ) -> Result<(), ChainError>;

    /// The chain's block counter.
    fn block_counter(&self) -> BlockCounter;
}

#[async_trait]
impl<T: ChainHandle + ?Sized> ChainHandle for std::sync::Arc<T> {
    fn operator_address(&self) -> Address {
        (**self).operator_address()
    }

    async fn on_keep_created(&self) -> Result<mpsc::Receiver<KeepCreated>, ChainError> {
        (**self).on_keep_created().await
    }

    async fn on_signature_requested(
        &self,
        keep: &KeepId,
    ) -> Result<mpsc::Receiver<SignatureRequested>, ChainError> {
        (**self).on_signature_requested(keep).await
    }

    async fn on_keep_closed(
        &self,
        keep: &KeepId,
    ) -> Result<mpsc::Receiver<KeepClosed>, ChainError> {
        (**self).on_keep_closed(keep).await
    }

    async fn submit_public_key(
        &self,
        keep: &KeepId,
        public_key: [u8; 64],
    ) -> Result<(), ChainError> {
        (**self).submit_public_key(keep, public_key).await
    }

    async fn submit_signature(
        &self,
        keep: &KeepId,
        digest: [u8; 32],
        signature: ChainSignature,
    ) -> Result<(), ChainError> {
        (**self).submit_signature(keep, digest, signature).await
    }

    fn block_counter(&self) -> BlockCounter {
        (**self).block_counter()
    }
}
