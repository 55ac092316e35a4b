//! multichain_sync - multichain wallet balance synchronizer
//!
//! Usage:
//!   multichain_sync sync    [--env <env>]   follow every configured chain
//!   multichain_sync migrate [--env <env>]   create registry and tenant tables
//!   multichain_sync version

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span, warn};

use multichain_sync::business::{BusinessStore, PgBusinessStore};
use multichain_sync::cache::AddressCache;
use multichain_sync::chain::{ChainAccountRpc, ChainGateway, JsonRpcChainAccount, TraversalCursor};
use multichain_sync::config::AppConfig;
use multichain_sync::db::Database;
use multichain_sync::ledger::{BalanceLedger, PgBalanceStore};
use multichain_sync::logging::init_logging;
use multichain_sync::notifier::Notifier;
use multichain_sync::sync::{ChainSyncer, DeltaClassifier, RoleClassifier, SyncSettings};

const USAGE: &str = "Usage: multichain_sync <sync|migrate|version> [--env <env>]";

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// First positional argument, skipping the value of `--env`
fn get_command() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--env" || arg == "-e" {
            args.next();
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(command) = get_command() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    if command == "version" {
        println!(
            "multichain_sync {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_HASH")
        );
        return Ok(());
    }
    if command != "sync" && command != "migrate" {
        eprintln!("Unknown command: {}\n{}", command, USAGE);
        std::process::exit(2);
    }

    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);

    info!(env = %env, command = %command, "Starting multichain_sync");

    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database health check failed")?;

    if command == "migrate" {
        let tenants = db.migrate().await?;
        info!(tenants, "Migration complete");
        return Ok(());
    }

    run_sync(&config, &db).await
}

async fn run_sync(config: &AppConfig, db: &Database) -> anyhow::Result<()> {
    anyhow::ensure!(!config.chains.is_empty(), "No chains configured");

    let rpc_timeout = Duration::from_millis(config.chain_account_rpc.timeout_ms);
    let rpc: Arc<dyn ChainAccountRpc> = Arc::new(JsonRpcChainAccount::new(
        &config.chain_account_rpc.url,
        rpc_timeout,
    )?);
    let address_cache = Arc::new(AddressCache::new(config.address_cache_capacity));

    let ledger = Arc::new(BalanceLedger::new(Arc::new(PgBalanceStore::new(
        db.pool().clone(),
    ))));
    let registry: Arc<dyn BusinessStore> = Arc::new(PgBusinessStore::new(db.pool().clone()));
    let classifier: Arc<dyn DeltaClassifier> = Arc::new(RoleClassifier::new(ledger.clone()));

    let settings = SyncSettings {
        poll_interval: Duration::from_millis(config.sync.poll_interval_ms),
        max_batch_size: config.sync.max_batch_size,
        ahead_alert_threshold: config.sync.ahead_alert_threshold,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for chain in &config.chains {
        let gateway = Arc::new(ChainGateway::new(
            rpc.clone(),
            &chain.name,
            &chain.network,
            rpc_timeout,
            address_cache.clone(),
        ));
        let from = ChainSyncer::resume_header(&gateway, chain.start_height)
            .await
            .with_context(|| format!("Failed to load start header for {}", chain.name))?;
        let cursor = TraversalCursor::new(gateway.clone(), from, chain.confirmations);
        let notifier = Notifier::new(Duration::from_millis(config.notifier.timeout_ms))?;

        let syncer = ChainSyncer::new(
            gateway,
            cursor,
            registry.clone(),
            &ledger,
            classifier.clone(),
            settings.clone(),
        )
        .with_notifier(notifier);

        info!(
            chain = %chain.name,
            network = %chain.network,
            confirmations = chain.confirmations,
            "Spawning chain syncer"
        );
        let span = info_span!("chain_syncer", chain = %chain.name, network = %chain.network);
        handles.push(tokio::spawn(syncer.run(shutdown_rx.clone()).instrument(span)));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    if shutdown_tx.send(true).is_err() {
        warn!("All chain syncers already stopped");
    }

    for handle in handles {
        handle.await?;
    }
    info!("multichain_sync stopped");
    Ok(())
}
