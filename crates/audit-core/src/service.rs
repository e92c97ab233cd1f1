//! Public facade over the chain, the pool and the settlement records.
//!
//! One `LedgerService` is built at startup and shared (usually behind an
//! `Arc`) by everything that needs the ledger. All mutations go through a
//! single write lock; queries take the read lock and see a consistent view.
//! Mining holds no ledger lock while it searches for a nonce.

use crate::block::Block;
use crate::chain::Ledger;
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::{IntegrityError, LedgerError, MiningError, Result, ValidationError};
use crate::pool::TransactionPool;
use crate::pow::{self, CancelToken};
use crate::query::{self, ChainStats, HistoryEvent, Settlements, TransactionStatus};
use crate::settlement::{SettlementRecord, SettlementStatus};
use crate::signature::{AcceptAllSignatures, SignatureVerifier};
use crate::snapshot::ChainSnapshot;
use crate::transaction::{LedgerTransaction, NewTransaction};
use crate::validation::{check_fields, is_valid_transaction, validate_transaction};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

struct LedgerState {
    ledger: Ledger,
    pool: TransactionPool,
    settlements: Settlements,
    /// Bumped whenever the chain is extended or replaced.
    generation: u64,
}

impl LedgerState {
    fn record_mut(&mut self, hash: &str) -> Result<&mut SettlementRecord> {
        if !self.settlements.contains_key(hash) {
            let created_at = self
                .pool
                .get(hash)
                .map(|tx| tx.timestamp)
                .or_else(|| self.ledger.locate(hash).map(|(_, tx)| tx.timestamp))
                .ok_or_else(|| LedgerError::NotFound(hash.to_string()))?;
            self.settlements
                .insert(hash.to_string(), SettlementRecord::pending(hash, created_at));
        }
        self.settlements
            .get_mut(hash)
            .ok_or_else(|| LedgerError::NotFound(hash.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub blocks: usize,
    pub pending_transactions: usize,
    pub difficulty: u32,
    pub latest_block_hash: String,
}

pub struct LedgerService {
    state: RwLock<LedgerState>,
    mining: Mutex<()>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl LedgerService {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(AcceptAllSignatures))
    }

    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_parts(config, clock, Arc::new(AcceptAllSignatures))
    }

    pub fn with_parts(
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = Ledger::new(config.difficulty, clock.now())?;
        info!(
            difficulty = config.difficulty,
            genesis = %ledger.latest_block().hash,
            "ledger initialised"
        );
        Ok(Self {
            state: RwLock::new(LedgerState {
                ledger,
                pool: TransactionPool::new(),
                settlements: Settlements::new(),
                generation: 0,
            }),
            mining: Mutex::new(()),
            config,
            clock,
            verifier,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a transaction into the pool. The returned copy carries the
    /// assigned hash and `blockNumber = None`.
    pub fn submit(&self, request: NewTransaction) -> Result<LedgerTransaction> {
        let now = self.clock.now();
        let tx = LedgerTransaction::admit(request, now)?;
        let mut state = self.write();
        let verdict =
            validate_transaction(&tx, &state.pool, &state.ledger, self.verifier.as_ref());
        if let Err(err) = verdict {
            debug!(hash = %tx.hash, error = %err, "transaction rejected");
            return Err(err.into());
        }
        state
            .settlements
            .insert(tx.hash.clone(), SettlementRecord::pending(&tx.hash, now));
        state.pool.push(tx.clone());
        debug!(hash = %tx.hash, kind = %tx.kind, signed_by = %tx.signed_by, "transaction admitted");
        Ok(tx)
    }

    /// Whether `tx` would pass admission against the current pool and chain.
    pub fn is_valid_transaction(&self, tx: &LedgerTransaction) -> bool {
        let state = self.read();
        is_valid_transaction(tx, &state.pool, &state.ledger, self.verifier.as_ref())
    }

    /// Move a transaction's settlement record from pending to confirmed.
    pub fn confirm(
        &self,
        hash: &str,
        confirmed_by: &str,
        signature: Option<String>,
    ) -> Result<SettlementRecord> {
        if !self.verifier.verify(confirmed_by, hash, signature.as_deref()) {
            return Err(ValidationError::SignatureRejected(confirmed_by.to_string()).into());
        }
        let now = self.clock.now();
        let mut state = self.write();
        let record = state.record_mut(hash)?;
        record.confirm(confirmed_by, signature, now)?;
        info!(hash, confirmed_by, "transaction confirmed");
        Ok(record.clone())
    }

    /// Move a transaction's settlement record from pending to failed.
    pub fn fail(&self, hash: &str, reason: &str) -> Result<SettlementRecord> {
        let now = self.clock.now();
        let mut state = self.write();
        let record = state.record_mut(hash)?;
        record.fail(reason, now)?;
        info!(hash, reason, "transaction failed");
        Ok(record.clone())
    }

    pub fn status(&self, hash: &str) -> TransactionStatus {
        let state = self.read();
        query::transaction_status(&state.ledger, &state.pool, &state.settlements, hash)
    }

    pub fn history(&self, hash: &str) -> Vec<HistoryEvent> {
        let state = self.read();
        query::transaction_history(&state.ledger, &state.pool, &state.settlements, hash)
    }

    pub fn settlement(&self, hash: &str) -> Option<SettlementRecord> {
        self.read().settlements.get(hash).cloned()
    }

    pub fn project_transactions(&self, project_id: &str) -> Vec<LedgerTransaction> {
        let state = self.read();
        query::correlated_transactions(
            &state.ledger,
            &state.pool,
            query::PROJECT_KEY,
            project_id,
            false,
        )
    }

    pub fn user_transactions(&self, user_id: &str) -> Vec<LedgerTransaction> {
        let state = self.read();
        query::correlated_transactions(&state.ledger, &state.pool, query::USER_KEY, user_id, true)
    }

    pub fn stats(&self) -> ChainStats {
        let state = self.read();
        query::chain_stats(&state.ledger, &state.pool, &state.settlements)
    }

    pub fn latest_block(&self) -> Block {
        self.read().ledger.latest_block().clone()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.read().ledger.block(index).cloned()
    }

    /// Up to `limit` consecutive blocks starting at index `start`.
    pub fn blocks(&self, start: u64, limit: usize) -> Vec<Block> {
        let state = self.read();
        let start = usize::try_from(start).unwrap_or(usize::MAX);
        state
            .ledger
            .blocks()
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn chain_len(&self) -> usize {
        self.read().ledger.len()
    }

    pub fn pending_transactions(&self) -> Vec<LedgerTransaction> {
        self.read().pool.iter().cloned().collect()
    }

    pub fn is_chain_valid(&self) -> bool {
        self.read().ledger.is_chain_valid()
    }

    pub fn verify(&self) -> std::result::Result<(), IntegrityError> {
        self.read().ledger.verify()
    }

    /// Seal up to `max_block_transactions` pool entries into a new block.
    /// Returns `None` when the pool is empty.
    pub fn mine_pending(&self, cancel: &CancelToken) -> Result<Option<Block>> {
        let limit = self.config.max_block_transactions;
        self.seal(cancel, |state| {
            let batch = state.pool.batch(limit);
            (!batch.is_empty()).then_some(batch)
        })
    }

    /// Seal exactly `transactions` into a new block. Pool entries with the
    /// same hashes are removed once the block is appended.
    pub fn mine_block(
        &self,
        transactions: Vec<LedgerTransaction>,
        cancel: &CancelToken,
    ) -> Result<Block> {
        self.check_batch(&transactions)?;
        let block = self.seal(cancel, |_| Some(transactions.clone()))?;
        block.ok_or(LedgerError::Mining(MiningError::Stale))
    }

    /// Field checks for caller-supplied entries, plus no repeats inside the
    /// batch or against the chain.
    fn check_batch(&self, transactions: &[LedgerTransaction]) -> Result<()> {
        let state = self.read();
        let mut seen = HashSet::new();
        for tx in transactions {
            check_fields(tx)?;
            if !seen.insert(tx.hash.as_str()) || state.ledger.contains_transaction(&tx.hash) {
                return Err(ValidationError::Duplicate(tx.hash.clone()).into());
            }
        }
        Ok(())
    }

    /// Snapshot a batch under the read lock, search with no lock held, then
    /// commit under the write lock if nothing moved underneath the search.
    fn seal<F>(&self, cancel: &CancelToken, pick: F) -> Result<Option<Block>>
    where
        F: Fn(&LedgerState) -> Option<Vec<LedgerTransaction>>,
    {
        let _miner = self.mining.lock().unwrap_or_else(PoisonError::into_inner);
        let options = self.config.mining.options(cancel.clone());

        for attempt in 0..=self.config.mining.stale_retries {
            let (template, difficulty, generation, from_pool) = {
                let state = self.read();
                let Some(batch) = pick(&*state) else {
                    return Ok(None);
                };
                let from_pool: HashSet<String> = batch
                    .iter()
                    .filter(|tx| state.pool.contains(&tx.hash))
                    .map(|tx| tx.hash.clone())
                    .collect();
                let template = state.ledger.next_template(batch, self.clock.now());
                (template, state.ledger.difficulty(), state.generation, from_pool)
            };

            let block = pow::mine(template, difficulty, &options)?;

            let mut state = self.write();
            let moved = state.generation != generation
                || from_pool.iter().any(|hash| !state.pool.contains(hash));
            if moved {
                warn!(attempt, index = block.index, "discarding stale block");
                continue;
            }
            state.ledger.append(block.clone())?;
            state
                .pool
                .remove_all(block.transactions.iter().map(|tx| tx.hash.as_str()));
            state.generation += 1;
            info!(
                index = block.index,
                transactions = block.transactions.len(),
                pending = state.pool.len(),
                "block appended"
            );
            return Ok(Some(block));
        }
        Err(MiningError::Stale.into())
    }

    /// Drop pool entries older than `max_age_hours`; returns how many went.
    pub fn cleanup(&self, max_age_hours: u64) -> usize {
        let now = self.clock.now();
        let cutoff = i64::try_from(max_age_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|age| now.checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut state = self.write();
        let removed = state.pool.remove_older_than(cutoff);
        for tx in &removed {
            let unsettled = state
                .settlements
                .get(&tx.hash)
                .is_some_and(|r| r.status == SettlementStatus::Pending);
            if unsettled {
                state.settlements.remove(&tx.hash);
            }
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), max_age_hours, "purged stale pending transactions");
        }
        removed.len()
    }

    pub fn export(&self) -> ChainSnapshot {
        let exported_at = self.clock.now();
        let state = self.read();
        ChainSnapshot::capture(&state.ledger, &state.pool, &state.settlements, exported_at)
    }

    /// Replace chain, pool and settlement records with a verified snapshot.
    /// Nothing changes if the snapshot fails any check.
    pub fn import(&self, snapshot: Value) -> Result<ImportSummary> {
        let restored = ChainSnapshot::from_json(snapshot)
            .and_then(ChainSnapshot::restore)
            .inspect_err(|err| warn!(error = %err, "snapshot import rejected"))?;

        let mut state = self.write();
        state.ledger = restored.ledger;
        state.pool = restored.pool;
        state.settlements = restored.settlements;
        state.generation += 1;

        let summary = ImportSummary {
            blocks: state.ledger.len(),
            pending_transactions: state.pool.len(),
            difficulty: state.ledger.difficulty(),
            latest_block_hash: state.ledger.latest_block().hash.clone(),
        };
        info!(blocks = summary.blocks, pending = summary.pending_transactions, "snapshot imported");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn service() -> (LedgerService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let config = LedgerConfig::default().with_difficulty(1);
        let service = LedgerService::with_clock(config, clock.clone()).unwrap();
        (service, clock)
    }

    fn submission() -> NewTransaction {
        NewTransaction::new("project_submission", "user1", json!({"amount": 100}))
    }

    #[test]
    fn concrete_scenario() {
        let (service, _) = service();
        let tx = service.submit(submission()).unwrap();
        assert!(!tx.hash.is_empty());
        assert_eq!(tx.block_number, None);

        let genesis = service.latest_block();
        let block = service.mine_block(vec![tx.clone()], &CancelToken::new()).unwrap();
        assert_eq!(service.chain_len(), 2);
        assert!(block.hash.starts_with('0'));
        assert_eq!(block.previous_hash, genesis.hash);

        match service.status(&tx.hash) {
            TransactionStatus::Confirmed {
                block_number,
                confirmations,
                ..
            } => {
                assert_eq!(block_number, 1);
                assert_eq!(confirmations, 1);
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(service.pending_transactions().is_empty());
    }

    #[test]
    fn same_instant_resubmission_is_a_duplicate() {
        let (service, clock) = service();
        service.submit(submission()).unwrap();
        let err = service.submit(submission()).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::Duplicate(_))));

        let retry = LedgerTransaction::admit(submission(), clock.now()).unwrap();
        assert!(!service.is_valid_transaction(&retry));

        clock.advance(Duration::milliseconds(1));
        assert!(service.submit(submission()).is_ok());
        assert_eq!(service.pending_transactions().len(), 2);
    }

    #[test]
    fn mine_block_checks_caller_supplied_entries() {
        let (service, clock) = service();
        let cancel = CancelToken::new();

        let unsigned = LedgerTransaction::admit(
            NewTransaction::new("project_submission", " ", json!({"amount": 1})),
            clock.now(),
        )
        .unwrap();
        assert!(matches!(
            service.mine_block(vec![unsigned], &cancel),
            Err(LedgerError::Validation(ValidationError::MissingField("signedBy")))
        ));

        let mut forged = LedgerTransaction::admit(submission(), clock.now()).unwrap();
        forged.data = json!({"amount": 1_000_000});
        assert!(matches!(
            service.mine_block(vec![forged], &cancel),
            Err(LedgerError::Validation(ValidationError::HashMismatch(_)))
        ));

        let tx = LedgerTransaction::admit(submission(), clock.now()).unwrap();
        assert!(matches!(
            service.mine_block(vec![tx.clone(), tx.clone()], &cancel),
            Err(LedgerError::Validation(ValidationError::Duplicate(_)))
        ));
        assert_eq!(service.chain_len(), 1);

        service.mine_block(vec![tx.clone()], &cancel).unwrap();
        assert!(matches!(
            service.mine_block(vec![tx], &cancel),
            Err(LedgerError::Validation(ValidationError::Duplicate(_)))
        ));
        assert_eq!(service.chain_len(), 2);
    }

    #[test]
    fn mine_pending_on_empty_pool_is_a_no_op() {
        let (service, _) = service();
        assert!(service.mine_pending(&CancelToken::new()).unwrap().is_none());
        assert_eq!(service.chain_len(), 1);
    }

    #[test]
    fn mine_pending_respects_batch_limit() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let config = LedgerConfig {
            difficulty: 1,
            max_block_transactions: 2,
            ..Default::default()
        };
        let service = LedgerService::with_clock(config, clock.clone()).unwrap();
        for i in 0..5 {
            clock.advance(Duration::seconds(1));
            service
                .submit(NewTransaction::new("t", "u", json!({"i": i})))
                .unwrap();
        }
        let block = service.mine_pending(&CancelToken::new()).unwrap().unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(service.pending_transactions().len(), 3);
    }

    #[test]
    fn cancelled_mining_leaves_state_untouched() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service =
            LedgerService::with_clock(LedgerConfig::default().with_difficulty(64), clock).unwrap();
        service.submit(submission()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = service.mine_pending(&cancel).unwrap_err();
        assert!(matches!(err, LedgerError::Mining(MiningError::Cancelled { .. })));
        assert_eq!(service.chain_len(), 1);
        assert_eq!(service.pending_transactions().len(), 1);
    }

    #[test]
    fn confirm_and_fail_transitions() {
        let (service, _) = service();
        let a = service.submit(submission()).unwrap();
        let b = service
            .submit(NewTransaction::new("evaluation", "user2", json!({"score": 7})))
            .unwrap();

        let record = service.confirm(&a.hash, "admin", Some("sig".into())).unwrap();
        assert_eq!(record.status, SettlementStatus::Confirmed);
        assert!(matches!(
            service.confirm(&a.hash, "admin", None),
            Err(LedgerError::AlreadyConfirmed(_))
        ));
        assert!(matches!(
            service.fail(&a.hash, "too late"),
            Err(LedgerError::AlreadySettled { .. })
        ));

        let record = service.fail(&b.hash, "rejected").unwrap();
        assert_eq!(record.status, SettlementStatus::Failed);
        assert!(matches!(
            service.fail(&b.hash, "again"),
            Err(LedgerError::AlreadySettled { .. })
        ));
        assert!(matches!(
            service.confirm("unknown", "admin", None),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(service.fail("unknown", "x"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn confirm_works_after_mining() {
        let (service, _) = service();
        let tx = service.submit(submission()).unwrap();
        service.mine_pending(&CancelToken::new()).unwrap();
        service.confirm(&tx.hash, "admin", None).unwrap();
        let history = service.history(&tx.hash);
        assert_eq!(history.len(), 3);
        assert!(matches!(history.last(), Some(HistoryEvent::Confirmed { .. })));
    }

    #[test]
    fn cleanup_purges_only_old_entries() {
        let (service, clock) = service();
        let old = service.submit(submission()).unwrap();
        clock.advance(Duration::hours(30));
        let fresh = service.submit(submission()).unwrap();

        assert_eq!(service.cleanup(24), 1);
        assert!(!service.status(&old.hash).is_found());
        assert!(service.settlement(&old.hash).is_none());
        assert!(service.status(&fresh.hash).is_found());
        assert_eq!(service.chain_len(), 1);
        assert_eq!(service.cleanup(u64::MAX), 0);
    }

    #[test]
    fn export_import_round_trip() {
        let (service, clock) = service();
        service.submit(submission()).unwrap();
        service.mine_pending(&CancelToken::new()).unwrap();
        clock.advance(Duration::seconds(1));
        service.submit(submission()).unwrap();

        let latest = service.latest_block().hash;
        let snapshot = serde_json::to_value(service.export()).unwrap();
        let summary = service.import(snapshot).unwrap();
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.pending_transactions, 1);
        assert_eq!(service.latest_block().hash, latest);
        assert!(service.is_chain_valid());
        assert_eq!(service.verify(), Ok(()));
    }

    #[test]
    fn failed_import_keeps_current_state() {
        let (service, _) = service();
        service.submit(submission()).unwrap();
        service.mine_pending(&CancelToken::new()).unwrap();
        let mut snapshot = serde_json::to_value(service.export()).unwrap();
        snapshot["chain"][1]["transactions"][0]["data"] = json!({"amount": 1});

        let before = service.latest_block().hash;
        assert!(matches!(service.import(snapshot), Err(LedgerError::Integrity(_))));
        assert!(matches!(service.import(json!({})), Err(LedgerError::InvalidFormat(_))));
        assert_eq!(service.latest_block().hash, before);
    }
}
