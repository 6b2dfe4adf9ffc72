use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::common::{DbError, PageId, Permissions, Result, TableId, TransactionId};
use crate::storage::page::PageRef;
use crate::transaction::{LockManager, LogWriter};
use crate::tuple::Tuple;

use super::{LruHandle, LruList};

/// A page held by the pool plus its position in the recency list
struct Resident {
    page: PageRef,
    handle: LruHandle,
}

impl Resident {
    /// A page may be evicted when it is clean and nobody is writing it right
    /// now. Callers may still hold a handle to an evicted page; a writer that
    /// dirties such a copy reinstalls it through `apply_dirtied`.
    fn is_evictable(&self) -> bool {
        self.page
            .try_read()
            .is_some_and(|page| page.is_dirty().is_none())
    }
}

/// Resident set and recency order, always mutated together under one mutex
struct PoolState {
    pages: HashMap<PageId, Resident>,
    recency: LruList<PageId>,
}

impl PoolState {
    /// Returns a resident page and marks it most recently used.
    fn get(&mut self, page_id: &PageId) -> Option<PageRef> {
        let resident = self.pages.get(page_id)?;
        self.recency.touch(resident.handle);
        Some(Arc::clone(&resident.page))
    }

    fn install(&mut self, page_id: PageId, page: PageRef) {
        let handle = self.recency.push_front(page_id);
        self.pages.insert(page_id, Resident { page, handle });
    }

    fn remove(&mut self, page_id: &PageId) -> Option<PageRef> {
        let resident = self.pages.remove(page_id)?;
        self.recency.remove(resident.handle);
        Some(resident.page)
    }

    /// Drops the least recently used evictable page. Dirty pages are never
    /// chosen, and eviction never writes to storage.
    fn evict(&mut self) -> Result<PageId> {
        let pages = &self.pages;
        let victim = self
            .recency
            .iter_lru()
            .find(|page_id| pages.get(page_id).is_some_and(Resident::is_evictable));

        match victim {
            Some(page_id) => {
                self.remove(&page_id);
                debug!(page = %page_id, "evicted page");
                Ok(page_id)
            }
            None => {
                warn!(resident = self.pages.len(), "no evictable page in buffer pool");
                Err(DbError::BufferPoolFull)
            }
        }
    }

    /// Makes room for one more page if the pool is at capacity.
    fn reserve(&mut self, capacity: usize) -> Result<()> {
        if self.pages.len() >= capacity {
            self.evict()?;
        }
        Ok(())
    }

    fn dirty_pages(&self, txn: TransactionId) -> Vec<PageRef> {
        self.pages
            .values()
            .filter(|resident| resident.page.read().is_dirty() == Some(txn))
            .map(|resident| Arc::clone(&resident.page))
            .collect()
    }
}

/// BufferPool caches a bounded number of pages in memory and is the single
/// path through which transactions read and write pages.
///
/// Every fetch first takes the matching page lock from the [`LockManager`].
/// The pool runs a no-steal policy: a dirty page is only written back when
/// its transaction commits (or by an explicit flush), so it can never be
/// evicted. Callers must not hold a page's read or write guard while calling
/// back into the pool.
pub struct BufferPool {
    /// Maximum number of resident pages
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    log: Arc<dyn LogWriter>,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Creates a new BufferPool that caches up to `capacity` pages.
    pub fn new(
        capacity: usize,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        log: Arc<dyn LogWriter>,
    ) -> Self {
        Self {
            capacity,
            catalog,
            lock_manager,
            log,
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(capacity),
                recency: LruList::with_capacity(capacity),
            }),
        }
    }

    /// Retrieves a page with the requested permissions, blocking while the
    /// page lock is held in a conflicting mode by another transaction.
    ///
    /// Fails with [`DbError::TransactionAborted`] when the lock cannot be
    /// granted in time and with [`DbError::BufferPoolFull`] when the page is
    /// not resident and nothing can be evicted to make room.
    pub fn fetch(
        &self,
        txn: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> Result<PageRef> {
        self.lock_manager.acquire(txn, page_id, perm.into())?;

        if let Some(page) = self.state.lock().get(&page_id) {
            return Ok(page);
        }

        // Storage is read without the pool mutex held
        let store = self.catalog.store(page_id.table_id())?;
        let page = store.read_page(page_id)?;

        let mut state = self.state.lock();
        if let Some(page) = state.get(&page_id) {
            return Ok(page);
        }
        state.reserve(self.capacity)?;

        debug!(%txn, page = %page_id, "loaded page into buffer pool");
        let page = Arc::new(RwLock::new(page));
        state.install(page_id, Arc::clone(&page));
        Ok(page)
    }

    /// Adds a tuple to a table on behalf of `txn`, locking and dirtying the
    /// pages the table's store touches.
    pub fn insert_tuple(
        &self,
        txn: TransactionId,
        table_id: TableId,
        tuple: &Tuple,
    ) -> Result<()> {
        let store = self.catalog.store(table_id)?;
        let dirtied = store.insert_tuple(self, txn, tuple)?;
        self.apply_dirtied(&dirtied, txn)
    }

    /// Removes a tuple (located by its record id) on behalf of `txn`.
    pub fn delete_tuple(&self, txn: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let store = self.catalog.store(record_id.page_id.table_id())?;
        let dirtied = store.delete_tuple(self, txn, tuple)?;
        self.apply_dirtied(&dirtied, txn)
    }

    /// Marks pages dirty for `txn` and makes them the resident version,
    /// replacing any other cached copy.
    pub fn apply_dirtied(&self, pages: &[PageRef], txn: TransactionId) -> Result<()> {
        let mut state = self.state.lock();
        for page in pages {
            let page_id = {
                let mut guard = page.write();
                guard.mark_dirty(true, txn);
                guard.id()
            };

            match state.pages.get_mut(&page_id) {
                Some(resident) => {
                    if !Arc::ptr_eq(&resident.page, page) {
                        resident.page = Arc::clone(page);
                    }
                    let handle = resident.handle;
                    state.recency.touch(handle);
                }
                None => {
                    state.reserve(self.capacity)?;
                    state.install(page_id, Arc::clone(page));
                }
            }
        }
        Ok(())
    }

    /// Writes one resident page back if it is dirty: logs its before and
    /// after images, writes it to its store, marks it clean and takes a new
    /// before-image. Returns whether anything was written.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let page = self
            .state
            .lock()
            .pages
            .get(&page_id)
            .map(|resident| Arc::clone(&resident.page));

        match page {
            Some(page) => self.write_back(&page),
            None => Ok(false),
        }
    }

    /// Writes back every page dirtied by `txn`.
    pub fn flush_pages(&self, txn: TransactionId) -> Result<()> {
        let dirty = self.state.lock().dirty_pages(txn);
        for page in &dirty {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Writes back every dirty resident page, whoever dirtied it.
    ///
    /// This breaks the no-steal guarantee for in-flight transactions; it is
    /// meant for checkpoints and shutdown only.
    pub fn flush_all(&self) -> Result<()> {
        let pages: Vec<PageRef> = self
            .state
            .lock()
            .pages
            .values()
            .map(|resident| Arc::clone(&resident.page))
            .collect();

        for page in &pages {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Removes a page from the pool without writing it, dirty or not.
    /// Returns whether the page was resident.
    pub fn discard(&self, page_id: PageId) -> bool {
        self.state.lock().remove(&page_id).is_some()
    }

    /// Finishes a transaction: commit when `commit` is true, abort otherwise.
    pub fn transaction_complete(&self, txn: TransactionId, commit: bool) -> Result<()> {
        if commit {
            self.commit(txn)
        } else {
            self.abort(txn)
        }
    }

    /// Writes back every page dirtied by `txn`, then releases its locks.
    ///
    /// A write failure is returned as-is with the locks still held; the
    /// caller is expected to abort.
    pub fn commit(&self, txn: TransactionId) -> Result<()> {
        self.flush_pages(txn)?;
        self.lock_manager.release_all(txn);
        debug!(%txn, "commit complete");
        Ok(())
    }

    /// Replaces every page dirtied by `txn` with the version in storage,
    /// then releases its locks.
    ///
    /// Under no-steal the stored version is the pre-transaction one. The
    /// locks are released even when a re-read fails; the first failure is
    /// returned.
    pub fn abort(&self, txn: TransactionId) -> Result<()> {
        let dirty = self.state.lock().dirty_pages(txn);

        let mut result = Ok(());
        for page in &dirty {
            if let Err(err) = self.revert(page) {
                warn!(%txn, error = %err, "failed to restore page on abort");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        self.lock_manager.release_all(txn);
        debug!(%txn, pages = dirty.len(), "abort complete");
        result
    }

    /// Releases a single page lock before the transaction ends.
    ///
    /// This gives up two-phase locking for that page; only callers that know
    /// the page was not read in a way that matters may use it.
    pub fn release_page(&self, txn: TransactionId, page_id: PageId) {
        self.lock_manager.release(txn, page_id);
    }

    /// Returns true if `txn` holds a lock on the page.
    pub fn holds_lock(&self, txn: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(txn, page_id)
    }

    /// Returns the number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Returns whether a page is resident.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    /// Returns the resident pages from least to most recently used.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.state.lock().recency.iter_lru().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    fn write_back(&self, page: &PageRef) -> Result<bool> {
        let mut guard = page.write();
        let Some(dirtier) = guard.is_dirty() else {
            return Ok(false);
        };

        let store = self.catalog.store(guard.id().table_id())?;

        // The update record must be durable before the page itself.
        self.log.log_write(dirtier, &guard.before_image(), &guard)?;
        self.log.force()?;
        store.write_page(&guard)?;

        guard.mark_dirty(false, dirtier);
        guard.set_before_image();
        debug!(txn = %dirtier, page = %guard.id(), "flushed page");
        Ok(true)
    }

    fn revert(&self, page: &PageRef) -> Result<()> {
        let page_id = page.read().id();
        let store = self.catalog.store(page_id.table_id())?;
        let stored = store.read_page(page_id)?;
        *page.write() = stored;
        Ok(())
    }
}
