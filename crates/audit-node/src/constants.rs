pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const BLOCKS_PER_BATCH: usize = 25;
pub const MAX_BLOCKS_PER_REQUEST: usize = BLOCKS_PER_BATCH * 10;
pub const DEFAULT_MINE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;
