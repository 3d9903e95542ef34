//! # Tess ECDSA
//!
//! The boundary between protocol orchestration and threshold cryptography.
//! A [`ProtocolSuite`] turns group descriptors into running party machines:
//! actors that consume and emit opaque round messages through mailboxes and
//! terminate with a key share or a signature.
//!
//! The GG19 rounds themselves are an external collaborator behind the
//! suite trait. The [`local`] suite included here is a dealer-based
//! stand-in that produces real secp256k1 keys and recoverable signatures
//! for `start-local` and the test suites; it exercises the same message
//! flow without providing threshold security.

pub mod error;
pub mod keyshare;
pub mod local;
pub mod party;
pub mod preparams;
pub mod signer;

pub use error::ProtocolError;
pub use keyshare::{GroupPublicKey, KeyShare, SecretShare, SignatureTriple};
pub use local::LocalSuite;
pub use party::{ProtocolSuite, RunningParty};
pub use preparams::PreParams;
pub use signer::{Signer, SignerCodecError};
