//! # Tess Core
//!
//! Foundation types shared by every layer of the tess operator node: member
//! and keep identifiers, group descriptors, the transport-level protocol
//! message, cancellation tokens, and the backoff policy used by everything
//! that retries. Each layer above defines the error type for its own
//! concern; this crate only carries validation errors for its own types.
//!
//! This crate has no dependency on other tess crates. Infrastructure
//! facades (`tess-chain`, `tess-network`) and the protocol layers build on
//! top of it.

pub mod backoff;
pub mod cancel;
pub mod defaults;
pub mod group;
pub mod identifiers;
pub mod message;

pub use backoff::Backoff;
pub use cancel::{CancelHandle, CancelToken};
pub use group::{GroupError, GroupInfo};
pub use identifiers::{KeepId, MemberId, MemberIdError, SessionId};
pub use message::ProtocolMessage;
