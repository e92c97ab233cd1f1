//! Periodic background work: sealing the pool and purging stale entries.

use crate::AppState;
use audit_core::{LedgerError, MiningError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub fn spawn_miner(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if state.cancel.is_cancelled() {
                break;
            }
            let ledger = state.ledger.clone();
            let cancel = state.cancel.clone();
            match tokio::task::spawn_blocking(move || ledger.mine_pending(&cancel)).await {
                Ok(Ok(Some(block))) => info!(
                    index = block.index,
                    transactions = block.transactions.len(),
                    "background miner sealed block"
                ),
                Ok(Ok(None)) => debug!("pool empty, nothing to mine"),
                Ok(Err(LedgerError::Mining(MiningError::Cancelled { .. }))) => break,
                Ok(Err(err)) => warn!(error = %err, "background mining failed"),
                Err(err) => error!(error = %err, "mining task panicked"),
            }
        }
        info!("background miner stopped");
    })
}

pub fn spawn_cleanup(state: AppState, every: Duration, max_age_hours: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh node does not
        // purge right away.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if state.cancel.is_cancelled() {
                break;
            }
            let removed = state.ledger.cleanup(max_age_hours);
            debug!(removed, "pool cleanup pass");
        }
    })
}
