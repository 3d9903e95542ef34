//! # Tess Agent
//!
//! The keep lifecycle manager: watches the chain for keeps this operator
//! belongs to, runs DKG through the session engine, persists the resulting
//! signer durably before publishing the group key, and serves signature
//! requests for every keep it holds a signer for. Per-keep failures are
//! isolated; the node keeps running as long as its chain subscription is
//! live.

pub mod config;
pub mod node;
pub mod store;

pub use config::{Config, ConfigError};
pub use node::{AgentError, KeepStatus, NodeConfig, OperatorNode};
pub use store::{PersistenceError, SignerStore};
