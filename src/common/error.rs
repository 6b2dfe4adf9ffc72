use thiserror::Error;

use super::types::{PageId, SlotId, TableId, TransactionId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{txn} aborted: lock wait on {page} exhausted")]
    TransactionAborted { txn: TransactionId, page: PageId },

    #[error("Buffer pool is full, every resident page is dirty or being written")]
    BufferPoolFull,

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("No table named {0:?}")]
    UnknownTable(String),

    #[error("Page {0} is beyond the end of its table file")]
    PageOutOfRange(PageId),

    #[error("Page {0} has no empty slots")]
    PageFull(PageId),

    #[error("Invalid slot {slot:?} on page {page}")]
    InvalidSlot { page: PageId, slot: SlotId },

    #[error("Slot {slot:?} on page {page} is empty")]
    EmptySlot { page: PageId, slot: SlotId },

    #[error("Tuple size mismatch: expected {expected} bytes, got {actual}")]
    TupleSizeMismatch { expected: usize, actual: usize },

    #[error("Tuple size {tuple_size} does not fit a {page_size}-byte page")]
    InvalidTupleSize { tuple_size: usize, page_size: usize },

    #[error("Page geometry needs {num_slots} slots, at most {max} are addressable")]
    TooManySlots { num_slots: usize, max: usize },

    #[error("Page {page} is {actual} bytes, its file uses {expected}-byte pages")]
    PageSizeMismatch {
        page: PageId,
        expected: usize,
        actual: usize,
    },

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("{txn} is {state}, expected ACTIVE")]
    InvalidTransactionState {
        txn: TransactionId,
        state: &'static str,
    },

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Corrupt log: {0}")]
    CorruptLog(String),
}

impl DbError {
    /// Returns true when the failure requires the transaction to be aborted.
    pub fn is_abort(&self) -> bool {
        matches!(self, DbError::TransactionAborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
