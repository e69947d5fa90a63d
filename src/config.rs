use std::time::Duration;

/// Give up on an archive after this many open attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes fetched per range request while streaming an entry.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Tunables for fetching an entry out of a remote archive.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub chunk_size: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: concat!("fwpluck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
