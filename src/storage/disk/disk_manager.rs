use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{page_size, Result};

/// DiskManager performs positioned page I/O against a single table file.
/// Page `n` lives at byte offset `n * page_size`; the page size is captured
/// from the process-wide setting when the file is opened.
pub struct DiskManager {
    /// The table file
    file: Mutex<File>,
    /// Path to the table file
    path: PathBuf,
    /// Page size in bytes for this file
    page_size: usize,
    /// Number of pages currently in the file
    num_pages: AtomicU32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens (creating if needed) the file at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let page_size = page_size();
        let file_size = file.metadata()?.len();
        let num_pages = file_size.div_ceil(page_size as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads page `page_number` into the provided buffer.
    /// Bytes past the end of the file read as zeros.
    pub fn read_page(&self, page_number: u32, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size, "Buffer must be page_size bytes");

        let offset = page_number as u64 * self.page_size as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes the provided buffer as page `page_number`, extending the file if needed.
    pub fn write_page(&self, page_number: u32, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), self.page_size, "Buffer must be page_size bytes");

        let offset = page_number as u64 * self.page_size as u64;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_pages.fetch_max(page_number + 1, Ordering::SeqCst);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends a zero-filled page to the file and returns its page number.
    pub fn allocate_page(&self) -> Result<u32> {
        let zeros = vec![0u8; self.page_size];

        // The file lock is held across the append so concurrent
        // allocations receive distinct page numbers.
        let mut file = self.file.lock();
        let page_number = self.num_pages.load(Ordering::SeqCst);
        file.seek(SeekFrom::Start(page_number as u64 * self.page_size as u64))?;
        file.write_all(&zeros)?;
        file.flush()?;
        self.num_pages.store(page_number + 1, Ordering::SeqCst);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(page_number)
    }

    /// Returns the number of pages in the file.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Returns the page size this file was opened with.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of page reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.file.get_mut();
        let _ = file.sync_all();
    }
}
