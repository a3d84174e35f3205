//! custodia-node — the custodial trading assistant's composition root.
//!
//! Startup sequence (mirrors `chronx-node::main`'s open DB → one-time
//! init → start background tasks → run main loop):
//!   1. Load and validate configuration from the environment.
//!   2. Open the persistent state database.
//!   3. Initialize the master encryption key handle.
//!   4. Materialize the owner row if this is a fresh database.
//!   5. Build the ledger batch-RPC client, balance cache, quote
//!      aggregator client, and swap pipeline.
//!   6. Build the DCA scheduler and the in-memory custody stores.
//!   7. Assemble the gateway pipeline.
//!   8. Spawn the shared TTL reaper and start the scheduler.
//!   9. Run until a shutdown signal arrives.
//!
//! The chat-messenger transport that would feed requests into the
//! gateway pipeline is out of scope (spec.md §1); this binary brings the
//! core up and keeps it running so an adapter process can be layered on
//! top of `custodia-gateway::GatewayPipeline` separately.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use custodia_auth::Authorizer;
use custodia_cache::{OperationLock, RateLimiter};
use custodia_config::Config;
use custodia_core::types::Mint;
use custodia_crypto::{MasterKeyHandle, Signer};
use custodia_custody::CustodyStores;
use custodia_gateway::GatewayPipeline;
use custodia_ledger::{BalanceCacheRepository, BatchRpcClient};
use custodia_repo::CustodiaDb;
use custodia_scheduler::{DcaScheduler, SwapPipelineExecutor};
use custodia_swap::{JupiterAggregatorClient, SwapPipeline};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,custodia=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    info!(environment = ?config.environment, "custodia-node starting");

    // ── Persistent state ──────────────────────────────────────────────
    // AUTH_DATABASE_PATH is validated at config load but the authorized/
    // invite trees are colocated with every other entity in the one
    // `CustodiaDb` — the embedded store is the single repository
    // implementation this workspace ships (spec.md §1 leaves the driver
    // choice open), so a second store is unneeded until an operator
    // actually needs physically separate files.
    let db = Arc::new(CustodiaDb::open(&config.database_path).context("opening state database")?);

    // ── Master key ────────────────────────────────────────────────────
    let master_key = Arc::new(
        MasterKeyHandle::init(&config.master_encryption_key).context("initializing master key")?,
    );

    // ── Owner row (idempotent) ────────────────────────────────────────
    GatewayPipeline::initialize_owner(&db, &config.owner_id, now_ms())
        .context("initializing owner row")?;
    Authorizer::new(&db)
        .initialize(&config.owner_id, now_ms())
        .context("initializing authorizer")?;

    // ── Ledger RPC + balance cache ────────────────────────────────────
    let rpc = BatchRpcClient::new(&config.rpc_url);
    let balances = Arc::new(BalanceCacheRepository::new(rpc.clone()));

    // ── Quote aggregator ──────────────────────────────────────────────
    let aggregator = Arc::new(JupiterAggregatorClient::new(
        "https://quote-api.jup.ag",
        config.quote_api_key.clone(),
    ));

    // ── Dev-mode signer (forbidden in production; enforced in Config) ─
    let dev_signer = match &config.dev_wallet_private_key {
        Some(raw) => {
            let mut seed = bs58::decode(raw)
                .into_vec()
                .context("decoding DEV_WALLET_PRIVATE_KEY as base58")?;
            let signer =
                Signer::from_seed(&seed).context("building dev-mode signer from seed")?;
            use zeroize::Zeroize;
            seed.zeroize();
            warn!(address = %signer.address(), "development signer bound — do not use in production");
            Some(Arc::new(signer))
        }
        None => None,
    };

    // ── Swap pipeline ─────────────────────────────────────────────────
    let swap_pipeline = Arc::new(SwapPipeline::new(
        aggregator,
        balances.clone(),
        rpc,
        db.clone(),
        master_key.clone(),
        dev_signer,
    ));

    // ── DCA scheduler ─────────────────────────────────────────────────
    let dca_executor = Arc::new(SwapPipelineExecutor::new(
        swap_pipeline.clone(),
        db.clone(),
        Mint::Native,
        Mint::Spl(config.dca_target_mint.clone()),
        config.dca_amount_quote,
    ));
    let scheduler = DcaScheduler::new(db.clone(), dca_executor, config.dca_interval_ms);

    // ── Custody stores + locks + rate limiter ─────────────────────────
    let custody = Arc::new(CustodyStores::new());
    let locks = Arc::new(OperationLock::new());
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_window_ms,
        config.rate_limit_max_requests,
    ));

    // ── Gateway pipeline ──────────────────────────────────────────────
    let _pipeline = GatewayPipeline::assemble(
        db.clone(),
        master_key,
        balances,
        swap_pipeline,
        scheduler.clone(),
        limiter.clone(),
        config.owner_id.clone(),
    );

    // ── Background reaper: one task sweeps every TTL-bounded map, the
    // rate limiter, and the operation-lock table on a single interval
    // (spec.md §4.2/§4.8 "periodic reaper"/"reaped periodically").
    tokio::spawn(reaper_loop(custody, limiter, locks));

    // ── Scheduler start (no-op if no active-DCA principals yet) ───────
    scheduler.start().await.context("starting DCA scheduler")?;

    info!("custodia-node ready");
    shutdown_signal().await;
    info!("shutdown signal received, stopping scheduler");
    scheduler.stop().ok();
    Ok(())
}

async fn reaper_loop(
    custody: Arc<CustodyStores>,
    limiter: Arc<RateLimiter>,
    locks: Arc<OperationLock>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(
        custodia_core::constants::REAPER_INTERVAL_MS,
    ));
    loop {
        interval.tick().await;
        let now = now_ms();
        let removed = custody.reap_all(now) + limiter.reap(now) + locks.reap(now);
        if removed > 0 {
            tracing::debug!(removed, "reaper: swept expired entries");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
