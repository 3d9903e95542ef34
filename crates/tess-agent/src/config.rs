//! Operator configuration.
//!
//! Loaded from TOML. The key-file password is never read from the file;
//! it comes from the `KEEP_ETHEREUM_PASSWORD` environment variable.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tess_chain::Address;

/// Environment variable holding the operator key-file password.
pub const PASSWORD_ENV: &str = "KEEP_ETHEREUM_PASSWORD";

/// Configuration errors; all fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {reason}")]
    Read {
        /// Path given on the command line.
        path: PathBuf,
        /// Underlying error.
        reason: String,
    },

    /// The TOML failed to parse.
    #[error("malformed config: {0}")]
    Parse(String),

    /// A sanctioned application address is not 20-byte hex.
    #[error("invalid application address {value:?}")]
    InvalidAddress {
        /// The offending value.
        value: String,
    },

    /// `KEEP_ETHEREUM_PASSWORD` is not set.
    #[error("key file password missing: set KEEP_ETHEREUM_PASSWORD")]
    MissingPassword,
}

/// Top-level operator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Ledger connection settings.
    #[serde(rename = "Ethereum", default)]
    pub ethereum: EthereumConfig,
    /// Signer storage settings.
    #[serde(rename = "Storage")]
    pub storage: StorageConfig,
    /// Peer-to-peer settings.
    #[serde(rename = "LibP2P", default)]
    pub libp2p: LibP2pConfig,
    /// Applications this operator serves.
    #[serde(rename = "SanctionedApplications", default)]
    pub sanctioned_applications: SanctionedApplications,
}

/// `[Ethereum]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EthereumConfig {
    /// RPC endpoint.
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Operator account settings.
    #[serde(rename = "Account", default)]
    pub account: AccountConfig,
}

/// `[Ethereum.Account]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    /// Path to the operator key file.
    #[serde(rename = "KeyFile", default)]
    pub key_file: PathBuf,
    /// Password for the key file; populated from the environment, never
    /// from the file.
    #[serde(skip)]
    pub key_file_password: Option<String>,
}

/// `[Storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding persisted signers.
    #[serde(rename = "DataDir")]
    pub data_dir: PathBuf,
}

/// `[LibP2P]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibP2pConfig {
    /// Listen port.
    #[serde(rename = "Port", default)]
    pub port: u16,
    /// Bootstrap peer list.
    #[serde(rename = "Peers", default)]
    pub peers: Vec<String>,
    /// Addresses announced to peers.
    #[serde(rename = "AnnouncedAddresses", default)]
    pub announced_addresses: Vec<String>,
}

/// `[SanctionedApplications]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SanctionedApplications {
    /// 20-byte hex addresses of the applications served.
    #[serde(rename = "Addresses", default)]
    pub addresses: Vec<String>,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    /// Parse the sanctioned application list into addresses.
    pub fn sanctioned_addresses(&self) -> Result<Vec<Address>, ConfigError> {
        self.sanctioned_applications
            .addresses
            .iter()
            .map(|value| {
                Address::from_hex(value).map_err(|_| ConfigError::InvalidAddress {
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Fill in the key-file password from the environment. Required for
    /// live mode, not for local mode.
    pub fn resolve_password(&mut self) -> Result<(), ConfigError> {
        match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => {
                self.ethereum.account.key_file_password = Some(password);
                Ok(())
            }
            _ => Err(ConfigError::MissingPassword),
        }
    }
}
