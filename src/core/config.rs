//! Store configuration.
//!
//! The core never inspects its environment: the backing-store location and
//! every ceiling arrive already resolved from whatever loads configuration in
//! the host process.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-entity capacity ceilings. A ceiling of zero is treated as
/// one, matching the pool-size clamp.
pub const DEFAULT_MAX_DECISIONS: usize = 1_000;
pub const DEFAULT_MAX_PATTERNS: usize = 500;
pub const DEFAULT_MAX_CONTEXT_KEYS: usize = 500;

/// Default pool size. Smaller than SQLite's writer capacity on purpose: it
/// serializes writes and bounds resource use without an explicit write mutex.
pub const DEFAULT_POOL_SIZE: usize = 5;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_RATE_LIMIT_MAX_OPS: u32 = 100;

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Absolute, already-resolved path to the backing SQLite file.
    pub db_path: PathBuf,
    pub max_decisions: usize,
    pub max_patterns: usize,
    pub max_context_keys: usize,
    pub pool_size: usize,
    /// Upper bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    pub rate_limit_window: Duration,
    pub rate_limit_max_ops: u32,
}

impl MemoryConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_decisions: DEFAULT_MAX_DECISIONS,
            max_patterns: DEFAULT_MAX_PATTERNS,
            max_context_keys: DEFAULT_MAX_CONTEXT_KEYS,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            rate_limit_max_ops: DEFAULT_RATE_LIMIT_MAX_OPS,
        }
    }
}
