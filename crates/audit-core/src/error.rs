//! Error taxonomy for the audit ledger.

use thiserror::Error;

/// Everything the ledger core can fail with.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("transaction {hash} is already settled as {status}")]
    AlreadySettled { hash: String, status: String },

    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("corrupted chain: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("mining aborted: {0}")]
    Mining(#[from] MiningError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Reasons a transaction is refused at admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("duplicate transaction hash {0}")]
    Duplicate(String),

    #[error("transaction hash {0} does not match its content")]
    HashMismatch(String),

    #[error("signature rejected for signer {0}")]
    SignatureRejected(String),
}

/// First violation found while walking the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("chain is empty")]
    Empty,

    #[error("genesis block must have index 0 and previous hash \"0\"")]
    InvalidGenesis,

    #[error("broken link at block {index}: expected previous hash {expected}, got {actual}")]
    BrokenLink {
        index: u64,
        expected: String,
        actual: String,
    },

    #[error("hash mismatch at block {index}: computed {expected}, stored {actual}")]
    HashMismatch {
        index: u64,
        expected: String,
        actual: String,
    },

    #[error("index gap: expected block {expected}, got {actual}")]
    IndexGap { expected: u64, actual: u64 },
}

/// Why a proof-of-work search stopped without sealing a block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("no nonce found within {attempts} attempts")]
    Exhausted { attempts: u64 },

    #[error("timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("chain or pool changed during the search")]
    Stale,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
