//! AttestGate verification server.
//!
//! Serves challenge issuance, attestation verification, node registration,
//! and signed-claim scoring over HTTP. All state is in memory; durable
//! node and claim storage belongs to the ledger layer in front of this
//! service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use attestgate_core::{EngineConfig, ScoringConfig, TrustScorer};

mod http;
mod service;

use service::NodeService;

#[derive(Debug, Parser)]
#[command(name = "attestgate-server", about = "Attestation verification server")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Challenge time-to-live in seconds.
    #[arg(long, default_value_t = 300)]
    challenge_ttl_secs: u64,

    /// Interval between stale-challenge sweeps, in seconds.
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,

    /// JSON file of scoring weights; omitted fields keep their defaults.
    #[arg(long)]
    scoring_config: Option<PathBuf>,

    /// Minimum trust score a submission must reach to earn a reward.
    /// Overrides the scoring config file when both are given.
    #[arg(long)]
    min_score_threshold: Option<i64>,

    /// Reject chains whose chain-of-trust walk fails.
    #[arg(long)]
    require_trusted_chain: bool,

    /// Skip TEE and signature verification. Development only.
    #[arg(long)]
    dev_mode: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if cli.dev_mode {
        warn!("dev mode enabled: attestation and signature checks are bypassed");
    }

    let config = EngineConfig {
        challenge_ttl: Duration::from_secs(cli.challenge_ttl_secs),
        sweep_interval: Duration::from_secs(cli.sweep_interval_secs),
        require_trusted_chain: cli.require_trusted_chain,
        dev_mode: cli.dev_mode,
    };
    let mut scoring = match &cli.scoring_config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<ScoringConfig>(&text)
                .with_context(|| format!("invalid scoring config in {}", path.display()))?
        },
        None => ScoringConfig::default(),
    };
    if let Some(threshold) = cli.min_score_threshold {
        scoring.min_score_threshold = threshold;
    }

    let sweep_interval = config.sweep_interval;
    let service = Arc::new(NodeService::new(config, TrustScorer::new(scoring)));

    // Background sweep keeps the store bounded even if no registration
    // ever touches a stale entry.
    let store = service.challenges();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                debug!(removed, "swept expired challenges");
            }
        }
    });

    let app = http::router(service);
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(addr = %cli.bind, "attestgate server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install ctrl-c handler");
        return;
    }
    info!("shutdown signal received");
}
