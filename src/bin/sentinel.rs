// =============================================================================
// sentinel — demo entry point wiring the engine to in-memory demo adapters
// =============================================================================
//
// This binary is a demonstration harness, not a production blockchain
// integration: `DemoPoolProtector`, `DemoCrossChainDefender`, and the
// scripted sources stand in for real RPC/ABI adapters, which are external
// collaborators outside this crate's scope.
// =============================================================================

use std::sync::Arc;

use sentinel_core::config::SentinelConfig;
use sentinel_core::engine::SentinelEngine;
use sentinel_core::protector::{DemoCrossChainDefender, DemoPoolProtector};
use sentinel_core::types::{RawSignal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("sentinel starting up");

    let config = SentinelConfig::load("sentinel_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        SentinelConfig::default()
    });

    let engine = Arc::new(SentinelEngine::new(
        config,
        Arc::new(DemoPoolProtector::default()),
        Arc::new(DemoCrossChainDefender),
        chrono::Utc::now().timestamp_millis(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let executor_loop = {
        let engine = engine.clone();
        tokio::spawn(engine.run_executor_loop(shutdown_rx))
    };

    // Feed a scripted burst of flash-loan signals for demonstration: a
    // real deployment wires Scout/Validator to live chain observations
    // instead of this loop.
    for i in 0..6 {
        engine.ingest_signal(RawSignal::new(
            SignalKind::FlashLoan,
            "ethereum",
            "ETH/USDC",
            "demo-pool",
            1.0,
            i * 1_000,
        ));
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }

    for pool in engine.monitored_pools() {
        info!(
            pool_key = %pool.pool_key,
            tier = %pool.tier,
            score = pool.composite_score,
            "monitored pool snapshot"
        );
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = tokio::time::sleep(tokio::time::Duration::from_secs(2)) => {
            info!("demo window elapsed");
        }
    }

    let _ = shutdown_tx.send(true);
    let grace_period = tokio::time::Duration::from_secs(5);
    if tokio::time::timeout(grace_period, executor_loop).await.is_err() {
        warn!("executor loop did not exit within the shutdown grace period");
    }

    info!("sentinel shutdown complete");
    Ok(())
}
