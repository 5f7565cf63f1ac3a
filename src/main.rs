mod captcha;
mod config;
mod entities;
mod explorer;
mod faucet;
mod http;
mod rpc;
mod state;
mod sweeper;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use crate::captcha::ChallengeIssuer;
use crate::config::{ApiConfig, DatabaseConfig, StoreBackend};
use crate::explorer::Explorer;
use crate::faucet::Faucet;
use crate::faucet::database::PgFaucetStore;
use crate::faucet::store::{FaucetStore, MemoryFaucetStore};
use crate::faucet::wallet::{SigningWallet, TransferWallet};
use crate::rpc::{ChainRpc, RpcClient};
use crate::state::{AppState, ExplorerCache};
use crate::sweeper::ExpirySweeper;
use anyhow::{Context, Result, anyhow};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;

    let client = RpcClient::new(&config.chain.rpc_url, config.chain.request_timeout())
        .context("Failed to initialize RPC client")?;
    let rpc_timeout = client.timeout();
    let rpc: Arc<dyn ChainRpc> = Arc::new(client);
    let chain_id = match config.chain.chain_id {
        Some(chain_id) => chain_id,
        None => rpc
            .chain_id()
            .await
            .context("Failed to query chain id from the node")?,
    };
    info!(
        "Serving chain {chain_id} via {} (timeout {rpc_timeout:?})",
        config.chain.rpc_url
    );

    let store = build_store(&config).await?;
    let wallet =
        SigningWallet::from_env(&config.faucet.private_key_env, Arc::clone(&rpc), chain_id)
            .context("Failed to load the faucet wallet")?;
    info!("Faucet wallet {}", wallet.address());

    let challenges = Arc::new(ChallengeIssuer::new(&config.captcha));
    let cache = Arc::new(ExplorerCache::new(&config.cache));
    let explorer = Arc::new(Explorer::new(
        Arc::clone(&rpc),
        Arc::clone(&cache),
        config.explorer.clone(),
    ));
    let faucet = Arc::new(Faucet::new(
        Arc::clone(&store),
        Arc::new(wallet),
        challenges.clone(),
        Arc::clone(&rpc),
        &config.faucet,
    )?);
    let app_state = AppState::new(explorer, faucet, challenges, cache, Arc::clone(&rpc));

    let sweeper = ExpirySweeper::new(store, config.faucet.sweep_interval());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn(async move {
        if let Err(err) = sweeper.run(shutdown_rx).await {
            error!("Sweeper terminated with error: {err}");
        }
    });

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Testnet devtools API listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await
        .context("HTTP server exited with error")?;

    shutdown_tx.send(true).ok();
    if let Err(join_err) = sweeper_handle.await {
        error!("Sweeper task join error: {join_err}");
    }

    Ok(())
}

fn init_tracing() {
    let default_filter = "info,tower_http=debug";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn build_store(config: &ApiConfig) -> Result<Arc<dyn FaucetStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory faucet store; rate limits reset on restart");
            Ok(Arc::new(MemoryFaucetStore::new()))
        }
        StoreBackend::Postgres => {
            let settings = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow!("[database] section is required for the postgres store"))?;
            let database = connect_database(settings).await?;
            run_migrations(&database).await?;
            Ok(Arc::new(PgFaucetStore::new(database)))
        }
    }
}

async fn connect_database(config: &DatabaseConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.max_connections >= config.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(config.max_connections <= 128, "Connection pool oversized");

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
