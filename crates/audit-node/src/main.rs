use anyhow::Context;
use audit_core::{LedgerConfig, LedgerService};
use audit_node::constants::{
    DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_LISTEN, DEFAULT_MINE_INTERVAL_SECS,
};
use audit_node::{router, tasks, AppState};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "audit-node", about = "HTTP node for the audit ledger")]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// JSON file with a ledger configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Leading zero hex characters required in a block hash
    #[arg(long)]
    difficulty: Option<u32>,

    /// Search nonces on all cores
    #[arg(long)]
    parallel_mining: bool,

    /// Give up a nonce search after this many attempts
    #[arg(long)]
    max_attempts: Option<u64>,

    /// Give up a nonce search after this many milliseconds
    #[arg(long)]
    mining_timeout_ms: Option<u64>,

    /// Seconds between background mining passes (0 disables)
    #[arg(long, default_value_t = DEFAULT_MINE_INTERVAL_SECS)]
    mine_interval_secs: u64,

    /// Seconds between pool cleanup passes (0 disables)
    #[arg(long, default_value_t = DEFAULT_CLEANUP_INTERVAL_SECS)]
    cleanup_interval_secs: u64,

    /// Age after which pending transactions are purged
    #[arg(long)]
    pending_max_age_hours: Option<u64>,
}

impl Args {
    fn ledger_config(&self) -> anyhow::Result<LedgerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                LedgerConfig::from_json_str(&raw)?
            }
            None => LedgerConfig::default(),
        };
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if self.parallel_mining {
            config.mining.parallel = true;
        }
        if self.max_attempts.is_some() {
            config.mining.max_attempts = self.max_attempts;
        }
        if self.mining_timeout_ms.is_some() {
            config.mining.timeout_ms = self.mining_timeout_ms;
        }
        if let Some(hours) = self.pending_max_age_hours {
            config.pending_max_age_hours = hours;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.ledger_config()?;
    let max_age = config.pending_max_age_hours;
    let ledger = Arc::new(LedgerService::new(config)?);
    let state = AppState::new(ledger);

    if args.mine_interval_secs > 0 {
        tasks::spawn_miner(state.clone(), Duration::from_secs(args.mine_interval_secs));
    }
    if args.cleanup_interval_secs > 0 {
        tasks::spawn_cleanup(
            state.clone(),
            Duration::from_secs(args.cleanup_interval_secs),
            max_age,
        );
    }

    let app = router(state.clone());
    let addr: SocketAddr = args.listen.parse()?;
    info!("audit-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            state.cancel.cancel();
        })
        .await?;
    Ok(())
}
