use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::common::{DbError, Result};

use super::DiskManager;

/// A disk I/O request. Buffers are owned by the request so the worker never
/// touches caller memory; completion is reported on the embedded channel.
pub enum DiskRequest {
    /// Read one page; the filled buffer is sent back
    Read {
        page_number: u32,
        reply: Sender<Result<Vec<u8>>>,
    },
    /// Write one page
    Write {
        page_number: u32,
        data: Vec<u8>,
        reply: Sender<Result<()>>,
    },
    /// Append a zero-filled page; its page number is sent back
    Allocate { reply: Sender<Result<u32>> },
}

/// DiskScheduler manages a background worker thread that processes disk I/O
/// requests for one file. Callers use the `*_sync` helpers, which queue a
/// request and block until the worker answers.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a disk request for processing by the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| DbError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for the page contents.
    pub fn schedule_read_sync(&self, page_number: u32) -> Result<Vec<u8>> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read {
            page_number,
            reply: tx,
        })?;
        Self::await_reply(&rx)
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_number: u32, data: Vec<u8>) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_number,
            data,
            reply: tx,
        })?;
        Self::await_reply(&rx)
    }

    /// Schedules a page allocation and waits for the new page number.
    pub fn schedule_allocate_sync(&self) -> Result<u32> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Allocate { reply: tx })?;
        Self::await_reply(&rx)
    }

    fn await_reply<T>(rx: &Receiver<Result<T>>) -> Result<T> {
        rx.recv().map_err(|e| {
            DbError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// The background worker thread function.
    /// Processes requests from the queue until shutdown is signaled.
    fn start_worker_thread(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(path = %disk_manager.path().display(), "disk scheduler stopped");
    }

    /// Processes a single disk request.
    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        // A dropped receiver means the caller went away; nothing to report.
        match request {
            DiskRequest::Read { page_number, reply } => {
                let mut data = vec![0u8; disk_manager.page_size()];
                let result = disk_manager.read_page(page_number, &mut data).map(|_| data);
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_number,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_number, &data));
            }
            DiskRequest::Allocate { reply } => {
                let _ = reply.send(disk_manager.allocate_page());
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
