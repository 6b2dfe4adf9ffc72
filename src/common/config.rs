use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer pool capacity (number of resident pages)
pub const DEFAULT_PAGES: usize = 50;

/// Default number of times a blocked lock request is re-evaluated before
/// the requesting transaction is aborted
pub const DEFAULT_LOCK_ATTEMPTS: usize = 3;

/// Default time a blocked lock request waits between evaluations
pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_millis(50);

/// File name of the update log inside a database directory
pub const LOG_FILE_NAME: &str = "heapdb.log";

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Returns the process-wide page size in bytes.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Acquire)
}

/// Overrides the process-wide page size.
///
/// Only meant for test harnesses: pages and heap files created before the
/// change keep their old geometry.
pub fn set_page_size(size: usize) {
    assert!(size > 0, "page size must be positive");
    PAGE_SIZE.store(size, Ordering::Release);
}

/// Restores the default page size.
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Release);
}

/// Bounded-wait policy used by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How many times a conflicting request is re-evaluated before giving up
    pub max_attempts: usize,
    /// Upper bound on each wait between evaluations
    pub backoff: Duration,
}

impl LockConfig {
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_ATTEMPTS, DEFAULT_LOCK_BACKOFF)
    }
}

/// Construction-time parameters of a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Buffer pool capacity in pages
    pub buffer_pool_pages: usize,
    /// Lock wait policy
    pub lock: LockConfig,
}

impl DatabaseConfig {
    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            buffer_pool_pages: DEFAULT_PAGES,
            lock: LockConfig::default(),
        }
    }
}
