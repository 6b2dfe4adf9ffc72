use crate::buffer::BufferPool;
use crate::common::{PageId, Permissions, Result, TableId, TransactionId};
use crate::storage::page::{HeapPage, PageRef};
use crate::tuple::Tuple;

/// Durable backing store for one table's pages.
///
/// Reads and writes bypass the buffer pool; tuple mutations go through it so
/// that every page they touch is locked on behalf of the transaction. The
/// mutation methods return the pages they dirtied.
pub trait PageStore: Send + Sync {
    /// Returns the table this store holds.
    fn table_id(&self) -> TableId;

    /// Reads a page directly from storage.
    fn read_page(&self, page_id: PageId) -> Result<HeapPage>;

    /// Writes a page directly to storage.
    fn write_page(&self, page: &HeapPage) -> Result<()>;

    /// Returns the number of pages currently in storage.
    fn num_pages(&self) -> u32;

    /// Adds a tuple, allocating a new page if every existing page is full.
    fn insert_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>>;

    /// Removes the tuple at its record id.
    fn delete_tuple(
        &self,
        pool: &BufferPool,
        txn: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>>;

    /// Reads every tuple of the table under shared page locks.
    fn scan(&self, pool: &BufferPool, txn: TransactionId) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for page_number in 0..self.num_pages() {
            let page_id = PageId::new(self.table_id(), page_number);
            let page = pool.fetch(txn, page_id, Permissions::ReadOnly)?;
            tuples.extend(page.read().tuples());
        }
        Ok(tuples)
    }
}
