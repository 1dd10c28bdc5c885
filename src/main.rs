//! GM Points Server
//!
//! Signs scores, settles daily claims and serves the leaderboard

use std::sync::Arc;

use gm_points::server::{build_state, run_server, LedgerMode};
use gm_points::{Config, GmStorage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting GM Points Server");

    let config = Config::load()?;

    let storage = Arc::new(GmStorage::open(&config.database.path)?);
    info!("SQLite storage initialized at {}", config.database.path);

    let signer = Config::signer_from_env()?;
    let admin_token = Config::admin_token_from_env();
    if admin_token.is_none() {
        info!("GM_ADMIN_TOKEN not set, admin leaderboard writes disabled");
    }

    let state = Arc::new(build_state(&config, storage, signer, admin_token)?);
    match &state.ledger {
        LedgerMode::Embedded(ledger) => info!(
            "Embedded claim ledger on chain {} at {}",
            ledger.domain().chain_id,
            config.chain.contract_address
        ),
        LedgerMode::Remote => info!("Indexing on-chain ledger via {}", config.chain.rpc_url),
        LedgerMode::Unconfigured(code) => warn!("Claim ledger disabled ({})", code),
    }

    // Background reconcile loop
    tokio::spawn(state.indexer.clone().run_loop(config.poll_interval()));
    info!(
        "Background leaderboard indexer started (every {} seconds)",
        config.indexer.poll_interval_secs
    );

    run_server(&config.server.host, config.server.port, state).await?;

    Ok(())
}
