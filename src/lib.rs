//! HeapDB - the transactional core of a heap-file RDBMS in Rust
//!
//! This crate provides page-level two-phase locking, a bounded no-steal page
//! cache and a commit/abort coordinator over tables stored as heap files.
//! Query operators sit on top of it and reach pages only through the buffer
//! pool, so every page they see is locked on behalf of their transaction.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages of one table file
//!   - `DiskScheduler`: Background worker that serializes disk requests
//!   - `HeapFile`: A table as an unordered sequence of heap pages
//!   - `HeapPage`: Fixed-width tuple slots behind an occupancy bitmap
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPool`: Fetches pages under page locks and caches them in memory
//!   - `LruList`: Recency order used to pick eviction victims
//!
//! - **Transactions** (`transaction`): Concurrency control and durability
//!   - `LockManager`: Shared/exclusive page locks with bounded waits
//!   - `LogFile`: Append-only log of page before/after images
//!   - `Transaction`: Commit/abort state machine
//!
//! - **Catalog** (`catalog`): Table id and name registry
//!
//! # Example
//!
//! ```rust,no_run
//! use heapdb::tuple::Tuple;
//! use heapdb::{Database, DatabaseConfig};
//!
//! let db = Database::open("demo_db", DatabaseConfig::default()).unwrap();
//! let table = db.create_table("numbers", "demo_db/numbers.dat", 8).unwrap();
//!
//! // Insert a tuple and make it durable
//! let mut txn = db.begin();
//! txn.insert_tuple(table, &Tuple::new(42u64.to_le_bytes().to_vec())).unwrap();
//! txn.commit().unwrap();
//!
//! // Read it back under shared locks
//! let mut reader = db.begin();
//! let tuples = reader.scan(table).unwrap();
//! reader.commit().unwrap();
//! assert_eq!(tuples.len(), 1);
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
mod database;
pub mod storage;
pub mod transaction;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{DatabaseConfig, DbError, PageId, Permissions, RecordId, Result, TransactionId};
pub use database::Database;
