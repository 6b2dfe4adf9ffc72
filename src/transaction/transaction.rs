use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::BufferPool;
use crate::common::{DbError, PageId, Permissions, Result, TableId, TransactionId};
use crate::storage::page::PageRef;
use crate::tuple::Tuple;

/// Lifecycle of a transaction. Nothing ever returns to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    Aborting,
    Aborted,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Active => "ACTIVE",
            TransactionState::Committing => "COMMITTING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::Aborting => "ABORTING",
            TransactionState::Aborted => "ABORTED",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction handle driving the commit/abort protocol.
///
/// Page access through the handle aborts the transaction as soon as a lock
/// wait is exhausted. Other failures are returned untouched and the
/// transaction stays active. Dropping an active handle aborts it.
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    pool: Arc<BufferPool>,
}

impl Transaction {
    /// Starts a new transaction against the given buffer pool.
    pub fn begin(pool: Arc<BufferPool>) -> Self {
        let id = TransactionId::new();
        debug!(txn = %id, "transaction started");
        Self {
            id,
            state: TransactionState::Active,
            pool,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Fetches a page with the requested permissions.
    pub fn fetch(&mut self, page_id: PageId, perm: Permissions) -> Result<PageRef> {
        self.ensure_active()?;
        let result = self.pool.fetch(self.id, page_id, perm);
        self.abort_on_lock_failure(result)
    }

    /// Inserts a tuple into a table.
    pub fn insert_tuple(&mut self, table_id: TableId, tuple: &Tuple) -> Result<()> {
        self.ensure_active()?;
        let result = self.pool.insert_tuple(self.id, table_id, tuple);
        self.abort_on_lock_failure(result)
    }

    /// Deletes a tuple at its record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        self.ensure_active()?;
        let result = self.pool.delete_tuple(self.id, tuple);
        self.abort_on_lock_failure(result)
    }

    /// Reads every tuple of a table.
    pub fn scan(&mut self, table_id: TableId) -> Result<Vec<Tuple>> {
        self.ensure_active()?;
        let result = self
            .pool
            .catalog()
            .store(table_id)
            .and_then(|store| store.scan(&self.pool, self.id));
        self.abort_on_lock_failure(result)
    }

    /// Flushes the transaction's dirty pages and releases its locks.
    ///
    /// If a page write fails part way, the remaining dirty pages are rolled
    /// back, the locks are released, the transaction ends up `Aborted` and the
    /// write error is returned. Pages written before the failure stay durable.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::Committing;

        match self.pool.commit(self.id) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(txn = %self.id, "transaction committed");
                Ok(())
            }
            Err(err) => {
                warn!(txn = %self.id, error = %err, "commit failed, rolling back");
                self.state = TransactionState::Aborting;
                if let Err(abort_err) = self.pool.abort(self.id) {
                    warn!(
                        txn = %self.id,
                        error = %abort_err,
                        "rollback after failed commit failed"
                    );
                }
                self.state = TransactionState::Aborted;
                Err(err)
            }
        }
    }

    /// Discards the transaction's dirty pages and releases its locks.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.state = TransactionState::Aborting;
        let result = self.pool.abort(self.id);
        self.state = TransactionState::Aborted;
        debug!(txn = %self.id, "transaction aborted");
        result
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(DbError::InvalidTransactionState {
                txn: self.id,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn abort_on_lock_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_abort() {
                if let Err(abort_err) = self.abort() {
                    warn!(txn = %self.id, error = %abort_err, "abort after lock failure failed");
                }
            }
        }
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if let Err(err) = self.abort() {
                warn!(txn = %self.id, error = %err, "abort on drop failed");
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}
