use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{DatabaseConfig, Result, TableId, LOG_FILE_NAME};
use crate::storage::disk::HeapFile;
use crate::storage::PageStore;
use crate::transaction::{LockManager, LogFile, LogWriter, Transaction};

/// Database wires the catalog, lock manager, log and buffer pool together.
///
/// Each component is built once here and handed to the others explicitly;
/// nothing is looked up through global state. Cloning the shared handles is
/// cheap, so several databases can coexist in one process.
pub struct Database {
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    log: Arc<dyn LogWriter>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    /// Opens a database rooted at `dir`, creating the directory and its
    /// update log if needed.
    pub fn open<P: AsRef<Path>>(dir: P, config: DatabaseConfig) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let log = LogFile::open(dir.join(LOG_FILE_NAME))?;
        info!(dir = %dir.display(), pages = config.buffer_pool_pages, "opened database");
        Ok(Self::with_log(config, Arc::new(log)))
    }

    /// Builds a database around an existing log writer.
    pub fn with_log(config: DatabaseConfig, log: Arc<dyn LogWriter>) -> Self {
        let catalog = Arc::new(Catalog::new());
        let lock_manager = Arc::new(LockManager::new(config.lock));
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            Arc::clone(&catalog),
            Arc::clone(&lock_manager),
            Arc::clone(&log),
        ));

        Self {
            catalog,
            lock_manager,
            log,
            buffer_pool,
        }
    }

    /// Opens (creating if needed) a heap file and registers it as `name`.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        name: &str,
        path: P,
        tuple_size: usize,
    ) -> Result<TableId> {
        let file = HeapFile::open(path, tuple_size)?;
        Ok(self.add_table(Arc::new(file), name))
    }

    /// Registers an already opened page store as `name`.
    pub fn add_table(&self, store: Arc<dyn PageStore>, name: &str) -> TableId {
        self.catalog.add_table(store, name)
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.buffer_pool))
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn log(&self) -> &Arc<dyn LogWriter> {
        &self.log
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }
}
