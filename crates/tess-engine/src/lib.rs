//! # Tess Engine
//!
//! Orchestration of one threshold-ECDSA session: the [`bridge`] translates
//! between the party machine's opaque round messages and the network
//! provider's channels, the readiness barrier keeps any party from starting
//! before the whole group is listening, and the [`session`] engine drives a
//! party to its terminal state. The [`preparams`] pool keeps one generated
//! bundle ahead of demand.

pub mod bridge;
pub mod error;
pub mod preparams;
mod ready;
pub mod session;

pub use bridge::NetworkBridge;
pub use error::SessionError;
pub use preparams::PreParamsPool;
pub use session::{SessionConfig, TssEngine};
