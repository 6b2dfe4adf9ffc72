use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::common::{DbError, PageId, Permissions, Result, TableId, TransactionId};
use crate::storage::page::{HeapPage, PageRef};
use crate::storage::PageStore;
use crate::tuple::Tuple;

use super::{DiskManager, DiskScheduler};

/// HeapFile stores a table's fixed-width tuples in no particular order, as a
/// plain sequence of heap pages. All file I/O goes through a [`DiskScheduler`].
pub struct HeapFile {
    table_id: TableId,
    tuple_size: usize,
    scheduler: DiskScheduler,
}

impl HeapFile {
    /// Opens (creating if needed) a heap file whose table id is derived from its path.
    pub fn open<P: AsRef<Path>>(path: P, tuple_size: usize) -> Result<Self> {
        let disk_manager = DiskManager::new(path)?;
        let table_id = Self::table_id_for(disk_manager.path());
        Self::with_disk_manager(table_id, tuple_size, disk_manager)
    }

    /// Opens (creating if needed) a heap file with an explicit table id.
    pub fn open_with_id<P: AsRef<Path>>(
        path: P,
        table_id: TableId,
        tuple_size: usize,
    ) -> Result<Self> {
        Self::with_disk_manager(table_id, tuple_size, DiskManager::new(path)?)
    }

    fn with_disk_manager(
        table_id: TableId,
        tuple_size: usize,
        disk_manager: DiskManager,
    ) -> Result<Self> {
        HeapPage::checked_slots(disk_manager.page_size(), tuple_size)?;

        Ok(Self {
            table_id,
            tuple_size,
            scheduler: DiskScheduler::new(Arc::new(disk_manager)),
        })
    }

    /// Stable table id for a file: a hash of its canonical path.
    pub fn table_id_for(path: &Path) -> TableId {
        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        hasher.finish() as TableId
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn page_size(&self) -> usize {
        self.disk_manager().page_size()
    }

    /// Returns the underlying disk manager (for I/O statistics).
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.scheduler.disk_manager()
    }

    /// Appends an empty page to the file.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_number = self.scheduler.schedule_allocate_sync()?;
        debug!(table = self.table_id, page_number, "allocated heap page");
        Ok(PageId::new(self.table_id, page_number))
    }

    fn check_page(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id() != self.table_id {
            return Err(DbError::TableNotFound(page_id.table_id()));
        }
        Ok(())
    }

    fn check_tuple_size(&self, tuple: &Tuple) -> Result<()> {
        if tuple.len() != self.tuple_size {
            return Err(DbError::TupleSizeMismatch {
                expected: self.tuple_size,
                actual: tuple.len(),
            });
        }
        Ok(())
    }
}

impl PageStore for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        self.check_page(page_id)?;
        if page_id.page_number() >= self.num_pages() {
            return Err(DbError::PageOutOfRange(page_id));
        }

        let data = self.scheduler.schedule_read_sync(page_id.page_number())?;
        HeapPage::new(page_id, data, self.tuple_size)
    }

    fn write_page(&self, page: &HeapPage) -> Result<()> {
        self.check_page(page.id())?;
        let page_size = self.page_size();
        if page.page_data().len() != page_size {
            return Err(DbError::PageSizeMismatch {
                page: page.id(),
                expected: page_size,
                actual: page.page_data().len(),
            });
        }
        self.scheduler
            .schedule_write_sync(page.id().page_number(), page.page_data().to_vec())
    }

    fn num_pages(&self) -> u32 {
        self.disk_manager().num_pages()
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        self.check_tuple_size(tuple)?;

        for page_number in 0..self.num_pages() {
            let page_id = PageId::new(self.table_id, page_number);

            // Look for space under a shared lock first; a full page we had
            // not touched before can be let go again right away.
            let held_before = pool.holds_lock(txn, page_id);
            let page = pool.fetch(txn, page_id, Permissions::ReadOnly)?;
            if page.read().num_empty_slots() == 0 {
                if !held_before {
                    pool.release_page(txn, page_id);
                }
                continue;
            }

            let page = pool.fetch(txn, page_id, Permissions::ReadWrite)?;
            {
                let mut guard = page.write();
                guard.insert_tuple(tuple.data())?;
                guard.mark_dirty(true, txn);
            }
            return Ok(vec![page]);
        }

        let page_id = self.allocate_page()?;
        let page = pool.fetch(txn, page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.insert_tuple(tuple.data())?;
            guard.mark_dirty(true, txn);
        }
        Ok(vec![page])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        self.check_page(record_id.page_id)?;

        let page = pool.fetch(txn, record_id.page_id, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(record_id)?;
            guard.mark_dirty(true, txn);
        }
        Ok(vec![page])
    }
}
