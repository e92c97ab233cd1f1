pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const MAX_BLOCK_TRANSACTIONS: usize = 100;
pub const DEFAULT_PENDING_MAX_AGE_HOURS: u64 = 24;
pub const DEFAULT_STALE_RETRIES: u32 = 3;
pub const SNAPSHOT_VERSION: &str = "1.0";
