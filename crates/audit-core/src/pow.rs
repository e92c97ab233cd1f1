//! Proof-of-work nonce search.

use crate::block::{Block, BlockTemplate};
use crate::error::{LedgerError, MiningError, Result};
use crate::hash::{meets_difficulty, HashEngine};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often the sequential search looks at the cancel flag and the clock.
const CHECK_INTERVAL: u64 = 1 << 12;

/// Cooperative cancellation shared between a miner and whoever may stop it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits applied to one search.
#[derive(Clone, Debug, Default)]
pub struct MiningOptions {
    pub parallel: bool,
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// Search nonces from 0 upward until the hash has `difficulty` leading zero
/// characters, then seal the template.
pub fn mine(template: BlockTemplate, difficulty: u32, options: &MiningOptions) -> Result<Block> {
    let prefix = template.prefix()?;
    let started = Instant::now();
    let (nonce, hash) = if options.parallel {
        search_parallel(&prefix, difficulty, options, started)?
    } else {
        search_sequential(&prefix, difficulty, options, started)?
    };
    info!(
        index = template.index,
        nonce,
        %hash,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "sealed block"
    );
    Ok(template.seal(nonce, hash, difficulty))
}

fn search_sequential(
    prefix: &HashEngine,
    difficulty: u32,
    options: &MiningOptions,
    started: Instant,
) -> Result<(u64, String)> {
    let limit = options.max_attempts.unwrap_or(u64::MAX);
    let mut nonce = 0u64;
    while nonce < limit {
        if nonce % CHECK_INTERVAL == 0 {
            check_interrupts(options, started, nonce)?;
        }
        let hash = prefix.clone().number(nonce).finish();
        if meets_difficulty(&hash, difficulty) {
            return Ok((nonce, hash));
        }
        nonce += 1;
    }
    Err(LedgerError::Mining(MiningError::Exhausted { attempts: limit }))
}

/// Rayon splits the nonce range across threads. The first hit wins, so the
/// nonce is not necessarily the smallest valid one.
fn search_parallel(
    prefix: &HashEngine,
    difficulty: u32,
    options: &MiningOptions,
    started: Instant,
) -> Result<(u64, String)> {
    let limit = options.max_attempts.unwrap_or(u64::MAX);
    let interrupted = AtomicBool::new(false);
    let found = (0..limit).into_par_iter().find_any(|&nonce| {
        if nonce % CHECK_INTERVAL == 0 && check_interrupts(options, started, nonce).is_err() {
            interrupted.store(true, Ordering::Relaxed);
        }
        if interrupted.load(Ordering::Relaxed) {
            return true;
        }
        meets_difficulty(&prefix.clone().number(nonce).finish(), difficulty)
    });

    match found {
        Some(nonce) => {
            let hash = prefix.clone().number(nonce).finish();
            if meets_difficulty(&hash, difficulty) {
                Ok((nonce, hash))
            } else {
                check_interrupts(options, started, nonce)?;
                Err(LedgerError::Mining(MiningError::Cancelled { attempts: nonce }))
            }
        }
        None => Err(LedgerError::Mining(MiningError::Exhausted { attempts: limit })),
    }
}

fn check_interrupts(options: &MiningOptions, started: Instant, attempts: u64) -> Result<()> {
    if options.cancel.is_cancelled() {
        debug!(attempts, "mining cancelled");
        return Err(LedgerError::Mining(MiningError::Cancelled { attempts }));
    }
    if let Some(timeout) = options.timeout {
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(LedgerError::Mining(MiningError::TimedOut {
                elapsed_ms: elapsed.as_millis() as u64,
            }));
        }
    }
    Ok(())
}
