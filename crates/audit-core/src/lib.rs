//! Hash-chained, proof-of-work sealed audit ledger.
//!
//! Callers submit transactions into a pool, a miner seals pool entries into
//! blocks whose hashes link back to a fixed genesis block, and a separate
//! settlement track records whether each transaction was confirmed or
//! failed by the application. Everything is in memory.

pub mod block;
pub mod chain;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod pool;
pub mod pow;
pub mod query;
pub mod service;
pub mod settlement;
pub mod signature;
pub mod snapshot;
pub mod transaction;
pub mod validation;

pub use block::{Block, BlockTemplate};
pub use chain::Ledger;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, MiningConfig};
pub use error::{IntegrityError, LedgerError, MiningError, Result, ValidationError};
pub use hash::{digest, HashEngine};
pub use pool::TransactionPool;
pub use pow::{CancelToken, MiningOptions};
pub use query::{ChainStats, HistoryEvent, TransactionStatus};
pub use service::{ImportSummary, LedgerService};
pub use settlement::{SettlementRecord, SettlementStatus};
pub use signature::{AcceptAllSignatures, SignatureVerifier};
pub use snapshot::ChainSnapshot;
pub use transaction::{LedgerTransaction, NewTransaction};
