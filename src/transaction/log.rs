use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::common::{DbError, PageId, Result, TransactionId};
use crate::storage::page::HeapPage;

/// Sink for page update records, written ahead of the page itself.
pub trait LogWriter: Send + Sync {
    /// Appends an update record carrying the page's before and after images.
    fn log_write(&self, txn: TransactionId, before: &HeapPage, after: &HeapPage) -> Result<()>;

    /// Makes every record appended so far durable.
    fn force(&self) -> Result<()>;
}

/// A decoded update record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecord {
    pub txn: TransactionId,
    pub page_id: PageId,
    pub before: Bytes,
    pub after: Bytes,
}

/// Update record layout (little endian):
///
/// | Field       | Size        |
/// |-------------|-------------|
/// | txn         | 8           |
/// | table_id    | 4           |
/// | page_number | 4           |
/// | image_len   | 4           |
/// | before      | image_len   |
/// | after       | image_len   |
const RECORD_HEADER_SIZE: usize = 20;

/// Append-only update log backed by a single file.
pub struct LogFile {
    file: Mutex<File>,
    path: PathBuf,
    /// Records appended through this handle
    records_written: AtomicU64,
}

impl LogFile {
    /// Opens (creating if needed) the log at the given path. Existing
    /// records are kept; new ones are appended.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            records_written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records appended through this handle.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Reads back every record in the log, oldest first.
    pub fn records(&self) -> Result<Vec<UpdateRecord>> {
        // Holding the append lock keeps a half-written record out of view.
        let _guard = self.file.lock();

        let mut raw = Vec::new();
        File::open(&self.path)?.read_to_end(&mut raw)?;

        let mut buf = Bytes::from(raw);
        let mut records = Vec::new();
        while buf.has_remaining() {
            records.push(Self::decode(&mut buf)?);
        }
        Ok(records)
    }

    fn encode(txn: TransactionId, before: &HeapPage, after: &HeapPage) -> BytesMut {
        let image_len = after.page_data().len();
        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + 2 * image_len);
        buf.put_u64_le(txn.as_u64());
        buf.put_u32_le(after.id().table_id());
        buf.put_u32_le(after.id().page_number());
        buf.put_u32_le(image_len as u32);
        buf.put_slice(before.page_data());
        buf.put_slice(after.page_data());
        buf
    }

    fn decode(buf: &mut Bytes) -> Result<UpdateRecord> {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(DbError::CorruptLog(format!(
                "truncated record header ({} bytes left)",
                buf.remaining()
            )));
        }

        let txn = TransactionId::from(buf.get_u64_le());
        let table_id = buf.get_u32_le();
        let page_number = buf.get_u32_le();
        let image_len = buf.get_u32_le() as usize;

        if buf.remaining() < 2 * image_len {
            return Err(DbError::CorruptLog(format!(
                "record for page {} needs {} image bytes, {} left",
                PageId::new(table_id, page_number),
                2 * image_len,
                buf.remaining()
            )));
        }

        Ok(UpdateRecord {
            txn,
            page_id: PageId::new(table_id, page_number),
            before: buf.split_to(image_len),
            after: buf.split_to(image_len),
        })
    }
}

impl LogWriter for LogFile {
    fn log_write(&self, txn: TransactionId, before: &HeapPage, after: &HeapPage) -> Result<()> {
        let record = Self::encode(txn, before, after);

        let mut file = self.file.lock();
        file.write_all(&record)?;
        file.flush()?;

        self.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn force(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }
}
