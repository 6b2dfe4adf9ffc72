use std::collections::{HashMap, HashSet};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::{DbError, LockConfig, PageId, Permissions, Result, TransactionId};

/// Page lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permissions> for LockMode {
    fn from(perm: Permissions) -> Self {
        match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// The two symmetric views of the granted locks. Both are always updated
/// under the same mutex; empty entries are removed.
#[derive(Debug, Default)]
struct LockTable {
    /// Page -> holders and their modes
    page_locks: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// Transaction -> pages it holds a lock on
    txn_locks: HashMap<TransactionId, HashSet<PageId>>,
}

impl LockTable {
    fn mode(&self, txn: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.page_locks
            .get(&page_id)
            .and_then(|holders| holders.get(&txn))
            .copied()
    }

    /// Grants the request if it is compatible with the current holders.
    fn try_grant(&mut self, txn: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        let holders = self.page_locks.get(&page_id);
        let held = holders.and_then(|h| h.get(&txn)).copied();

        let grantable = match (held, mode) {
            // Already sufficient
            (Some(_), LockMode::Shared) | (Some(LockMode::Exclusive), LockMode::Exclusive) => {
                return true
            }
            // Upgrade only when we are the sole holder
            (Some(LockMode::Shared), LockMode::Exclusive) => holders.is_some_and(|h| h.len() == 1),
            (None, LockMode::Shared) => {
                holders.map_or(true, |h| h.values().all(|&m| m == LockMode::Shared))
            }
            (None, LockMode::Exclusive) => holders.map_or(true, |h| h.is_empty()),
        };

        if grantable {
            self.page_locks
                .entry(page_id)
                .or_default()
                .insert(txn, mode);
            self.txn_locks.entry(txn).or_default().insert(page_id);
        }
        grantable
    }

    fn release(&mut self, txn: TransactionId, page_id: PageId) -> bool {
        let (removed, page_empty) = match self.page_locks.get_mut(&page_id) {
            Some(holders) => (holders.remove(&txn).is_some(), holders.is_empty()),
            None => (false, false),
        };
        if page_empty {
            self.page_locks.remove(&page_id);
        }

        let txn_empty = match self.txn_locks.get_mut(&txn) {
            Some(pages) => {
                pages.remove(&page_id);
                pages.is_empty()
            }
            None => false,
        };
        if txn_empty {
            self.txn_locks.remove(&txn);
        }

        removed
    }

    fn release_all(&mut self, txn: TransactionId) -> usize {
        let Some(pages) = self.txn_locks.remove(&txn) else {
            return 0;
        };

        for page_id in &pages {
            let page_empty = match self.page_locks.get_mut(page_id) {
                Some(holders) => {
                    holders.remove(&txn);
                    holders.is_empty()
                }
                None => false,
            };
            if page_empty {
                self.page_locks.remove(page_id);
            }
        }
        pages.len()
    }
}

/// Page-granularity shared/exclusive lock manager.
///
/// A request that conflicts with other holders waits on a condition variable
/// for at most `backoff` per attempt and is re-evaluated after every wake-up.
/// Once `max_attempts` waits pass without a grant the request fails with
/// [`DbError::TransactionAborted`]; a deadlock and a long-running holder are
/// handled the same way.
pub struct LockManager {
    table: Mutex<LockTable>,
    /// Signalled whenever locks are released
    released: Condvar,
    config: LockConfig,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            config,
        }
    }

    /// Acquires (or upgrades to) `mode` on a page for `txn`, blocking for a
    /// bounded time if other transactions hold conflicting locks.
    pub fn acquire(&self, txn: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let mut table = self.table.lock();
        if table.try_grant(txn, page_id, mode) {
            return Ok(());
        }

        debug!(%txn, page = %page_id, ?mode, "waiting for page lock");
        for _ in 0..self.config.max_attempts {
            self.released.wait_for(&mut table, self.config.backoff);
            if table.try_grant(txn, page_id, mode) {
                debug!(%txn, page = %page_id, ?mode, "page lock granted after wait");
                return Ok(());
            }
        }

        warn!(%txn, page = %page_id, ?mode, "lock wait exhausted");
        Err(DbError::TransactionAborted {
            txn,
            page: page_id,
        })
    }

    /// Releases one lock. Releasing a lock that is not held is a no-op.
    pub fn release(&self, txn: TransactionId, page_id: PageId) {
        let released = self.table.lock().release(txn, page_id);
        if released {
            self.released.notify_all();
        }
    }

    /// Releases every lock held by `txn` and wakes all waiters.
    pub fn release_all(&self, txn: TransactionId) {
        let count = self.table.lock().release_all(txn);
        if count > 0 {
            debug!(%txn, count, "released all page locks");
        }
        self.released.notify_all();
    }

    /// Returns true if `txn` holds any lock on the page.
    pub fn holds(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.table.lock().mode(txn, page_id).is_some()
    }

    /// Returns the mode `txn` holds on the page, if any.
    pub fn lock_mode(&self, txn: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table.lock().mode(txn, page_id)
    }

    /// Returns the pages `txn` holds locks on.
    pub fn locked_pages(&self, txn: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .txn_locks
            .get(&txn)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the current holders of a page lock.
    pub fn holders(&self, page_id: PageId) -> Vec<(TransactionId, LockMode)> {
        self.table
            .lock()
            .page_locks
            .get(&page_id)
            .map(|holders| holders.iter().map(|(&t, &m)| (t, m)).collect())
            .unwrap_or_default()
    }

    /// Returns the number of pages with at least one lock.
    pub fn locked_page_count(&self) -> usize {
        self.table.lock().page_locks.len()
    }

    pub fn config(&self) -> LockConfig {
        self.config
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
