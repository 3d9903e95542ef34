//! Tess operator node CLI.
//!
//! Two subcommands: `start` runs against a configured live ledger, and
//! `start-local` runs a self-contained smoke-test deployment with an
//! in-memory chain, an in-memory network, and the local protocol suite.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tess_agent::{Config, NodeConfig, OperatorNode, SignerStore};
use tess_chain::{local::LocalChain, Address};
use tess_core::{CancelHandle, KeepId, MemberId};
use tess_ecdsa::LocalSuite;
use tess_engine::{PreParamsPool, SessionConfig, TssEngine};
use tess_network::inmem::InMemoryNetwork;
use tracing::info;

/// Size of the smoke-test signing group in local mode.
const LOCAL_MEMBERS: u8 = 3;

#[derive(Parser)]
#[command(name = "tess")]
#[command(about = "Threshold-ECDSA keep operator node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true, default_value = "tess.toml")]
    config: PathBuf,

    /// Broadcast transport implementation to use
    #[arg(long, global = true, default_value = "libp2p")]
    broadcast_api: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run against the configured live chain
    Start,
    /// Run an in-process smoke test with an in-memory chain and network
    StartLocal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start => start(&cli).await,
        Commands::StartLocal => start_local(&cli).await,
    }
}

/// Live mode: validate the configuration, then hand off to the linked
/// chain backend.
async fn start(cli: &Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    config.resolve_password().context("resolving key password")?;
    let applications = config
        .sanctioned_addresses()
        .context("parsing sanctioned applications")?;
    info!(
        url = %config.ethereum.url,
        applications = applications.len(),
        "configuration validated"
    );

    if cli.broadcast_api != "libp2p" {
        bail!("unknown broadcast api {:?}", cli.broadcast_api);
    }
    // The live Ethereum and libp2p backends are linked by deployment
    // builds; this workspace ships the protocol core and the local stack.
    bail!(
        "no live chain backend is linked into this build; \
         use `tess start-local` or a deployment build"
    );
}

/// Local mode: three in-process operators, one demo keep, one demo
/// signature, then run until interrupted.
async fn start_local(cli: &Cli) -> Result<()> {
    if cli.broadcast_api != "libp2p" && cli.broadcast_api != "inmem" {
        bail!("unknown broadcast api {:?}", cli.broadcast_api);
    }
    let data_dir = match Config::load(&cli.config) {
        Ok(config) => config.storage.data_dir,
        Err(e) => {
            info!(error = %e, "no usable config; storing local-mode signers under a temp dir");
            std::env::temp_dir().join("tess-local")
        }
    };

    let chain = LocalChain::new(Address([0x01; 20]));
    chain.start_miner(Duration::from_secs(1));
    let network = InMemoryNetwork::new();

    let (cancel_handle, _token) = CancelHandle::new();
    let mut members = Vec::new();
    for id in 1..=LOCAL_MEMBERS {
        let provider = Arc::new(network.join(vec![id]));
        let suite = Arc::new(LocalSuite::new());
        let engine = Arc::new(TssEngine::with_config(
            suite.clone(),
            provider.clone(),
            SessionConfig::default(),
        ));
        let pool = Arc::new(PreParamsPool::start(
            suite,
            1,
            tess_core::defaults::PRE_PARAMS_TIMEOUT,
        ));
        let store = Arc::new(SignerStore::new(data_dir.join(format!("member-{id}"))));
        let node = OperatorNode::new(
            Arc::new(chain.clone()),
            provider,
            engine,
            store,
            pool,
            Vec::new(),
            NodeConfig::default(),
        )?;
        members.push(MemberId::from_bytes(vec![id])?);
        tokio::spawn(node.run(cancel_handle.token()));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let keep = KeepId::new("0x0101010101010101010101010101010101010101");
    chain
        .create_keep(keep.clone(), members, 1, Address([0xAA; 20]))
        .await;
    info!(keep = %keep, "demo keep created; waiting for the group public key");
    wait_for(|| chain.submitted_public_key(&keep).is_some()).await?;
    let public_key = chain
        .submitted_public_key(&keep)
        .context("public key submitted")?;
    info!(key = %hex::encode(public_key), "group public key published");

    let digest = [0x01u8; 32];
    chain.request_signature(&keep, digest).await?;
    wait_for(|| !chain.submitted_signatures(&keep).is_empty()).await?;
    let (_, signature) = chain.submitted_signatures(&keep)[0];
    info!(
        r = %hex::encode(signature.r),
        s = %hex::encode(signature.s),
        v = signature.v,
        "signature submitted; local smoke test passed"
    );

    info!("running until interrupted (ctrl-c)");
    tokio::signal::ctrl_c().await?;
    cancel_handle.cancel();
    info!("shut down cleanly");
    Ok(())
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(120);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("local smoke test timed out");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}
