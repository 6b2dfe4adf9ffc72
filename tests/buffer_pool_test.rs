//! Integration tests for the buffer pool

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use heapdb::common::{
    DatabaseConfig, DbError, LockConfig, PageId, Permissions, TransactionId, LOG_FILE_NAME,
};
use heapdb::storage::disk::HeapFile;
use heapdb::storage::PageStore;
use heapdb::transaction::{LockMode, LogFile};
use heapdb::tuple::Tuple;
use heapdb::Database;
use rand::Rng;
use tempfile::{tempdir, TempDir};

const TABLE: u32 = 1;
const TUPLE_SIZE: usize = 8;

struct Fixture {
    db: Database,
    file: Arc<HeapFile>,
    dir: TempDir,
}

fn create_fixture(capacity: usize, pages: u32) -> Fixture {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::default()
        .with_buffer_pool_pages(capacity)
        .with_lock_config(LockConfig::new(3, Duration::from_millis(10)));
    let db = Database::open(dir.path(), config).unwrap();

    let path = dir.path().join("t.dat");
    let file = Arc::new(HeapFile::open_with_id(path, TABLE, TUPLE_SIZE).unwrap());
    for _ in 0..pages {
        file.allocate_page().unwrap();
    }
    db.add_table(file.clone(), "t");

    Fixture { db, file, dir }
}

fn page(n: u32) -> PageId {
    PageId::new(TABLE, n)
}

/// Fetches a page exclusively, stores one tuple on it and marks it dirty.
fn dirty_page(fx: &Fixture, txn: TransactionId, page_id: PageId, byte: u8) {
    let pool = fx.db.buffer_pool();
    let page = pool.fetch(txn, page_id, Permissions::ReadWrite).unwrap();
    page.write().insert_tuple(&[byte; TUPLE_SIZE]).unwrap();
    pool.apply_dirtied(&[page], txn).unwrap();
}

#[test]
fn test_buffer_pool_fetch_caches_pages() {
    let fx = create_fixture(4, 2);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();

    let first = pool.fetch(txn, page(0), Permissions::ReadOnly).unwrap();
    let reads = fx.file.disk_manager().num_reads();
    let second = pool.fetch(txn, page(0), Permissions::ReadOnly).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fx.file.disk_manager().num_reads(), reads);
    assert_eq!(pool.resident_count(), 1);
    assert!(pool.is_resident(page(0)));
    assert_eq!(
        pool.lock_manager().lock_mode(txn, page(0)),
        Some(LockMode::Shared)
    );
}

#[test]
fn test_buffer_pool_fetch_missing_page() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();

    assert!(matches!(
        pool.fetch(txn, page(5), Permissions::ReadOnly),
        Err(DbError::PageOutOfRange(_))
    ));
    assert!(matches!(
        pool.fetch(txn, PageId::new(99, 0), Permissions::ReadOnly),
        Err(DbError::TableNotFound(99))
    ));
    assert_eq!(pool.resident_count(), 0);
}

#[test]
fn test_buffer_pool_full_of_dirty_pages() {
    let fx = create_fixture(1, 2);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    dirty_page(&fx, t1, page(0), 1);
    let writes = fx.file.disk_manager().num_writes();

    assert!(matches!(
        pool.fetch(t2, page(1), Permissions::ReadOnly),
        Err(DbError::BufferPoolFull)
    ));

    // The dirty page stays resident and nothing was written
    assert!(pool.is_resident(page(0)));
    assert_eq!(fx.file.disk_manager().num_writes(), writes);

    // Once t1 commits the page is clean and can make room
    pool.commit(t1).unwrap();
    pool.fetch(t2, page(1), Permissions::ReadOnly).unwrap();
    assert!(!pool.is_resident(page(0)));
}

#[test]
fn test_buffer_pool_evicts_held_clean_page() {
    let fx = create_fixture(1, 2);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    let held = pool.fetch(t1, page(0), Permissions::ReadOnly).unwrap();
    assert_eq!(held.read().is_dirty(), None);

    // A clean page is a victim even while a caller keeps its handle
    pool.fetch(t2, page(1), Permissions::ReadOnly).unwrap();
    assert_eq!(pool.resident_pages(), vec![page(1)]);
    assert_eq!(held.read().id(), page(0));
}

#[test]
fn test_buffer_pool_reinstalls_evicted_page_when_dirtied() {
    let fx = create_fixture(1, 2);
    let pool = fx.db.buffer_pool();
    let writer = TransactionId::new();
    let reader = TransactionId::new();

    let held = pool.fetch(writer, page(0), Permissions::ReadWrite).unwrap();
    pool.fetch(reader, page(1), Permissions::ReadOnly).unwrap();
    assert!(!pool.is_resident(page(0)));

    held.write().insert_tuple(&[6; TUPLE_SIZE]).unwrap();
    pool.apply_dirtied(&[Arc::clone(&held)], writer).unwrap();
    assert_eq!(pool.resident_pages(), vec![page(0)]);

    pool.commit(writer).unwrap();
    assert_eq!(fx.file.read_page(page(0)).unwrap().tuples().count(), 1);
}

#[test]
fn test_buffer_pool_concurrent_fetch_shares_one_copy() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let barrier = Barrier::new(8);

    let pages: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let txn = TransactionId::new();
                    barrier.wait();
                    pool.fetch(txn, page(0), Permissions::ReadOnly).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let resident = pool.fetch(TransactionId::new(), page(0), Permissions::ReadOnly).unwrap();
    assert!(pages.iter().all(|p| Arc::ptr_eq(p, &resident)));
    assert_eq!(pool.resident_count(), 1);
}

#[test]
fn test_buffer_pool_commit_makes_page_durable() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();

    dirty_page(&fx, t1, page(0), 0xAB);
    assert!(fx.file.read_page(page(0)).unwrap().tuples().next().is_none());

    pool.commit(t1).unwrap();
    assert!(pool.lock_manager().locked_pages(t1).is_empty());

    let on_disk = fx.file.read_page(page(0)).unwrap();
    let tuples: Vec<_> = on_disk.tuples().collect();
    assert_eq!(tuples.len(), 1);
    assert_eq!(tuples[0].data(), &[0xAB; TUPLE_SIZE]);

    let t2 = TransactionId::new();
    let cached = pool.fetch(t2, page(0), Permissions::ReadOnly).unwrap();
    let cached = cached.read();
    assert_eq!(cached.is_dirty(), None);
    assert_eq!(cached.page_data(), on_disk.page_data());
    assert_eq!(cached.before_image().page_data(), on_disk.page_data());
}

#[test]
fn test_buffer_pool_commit_logs_before_and_after_images() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();

    let before = fx.file.read_page(page(0)).unwrap();
    dirty_page(&fx, t1, page(0), 3);
    pool.commit(t1).unwrap();

    let log = LogFile::open(fx.dir.path().join(LOG_FILE_NAME)).unwrap();
    let records = log.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].txn, t1);
    assert_eq!(records[0].page_id, page(0));
    assert_eq!(&records[0].before[..], before.page_data());
    assert_eq!(
        &records[0].after[..],
        fx.file.read_page(page(0)).unwrap().page_data()
    );
}

#[test]
fn test_buffer_pool_abort_restores_page() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();

    let original = fx.file.read_page(page(0)).unwrap();
    dirty_page(&fx, t1, page(0), 9);
    let writes = fx.file.disk_manager().num_writes();

    pool.abort(t1).unwrap();
    assert_eq!(fx.file.disk_manager().num_writes(), writes);
    assert!(pool.lock_manager().locked_pages(t1).is_empty());

    let t2 = TransactionId::new();
    let cached = pool.fetch(t2, page(0), Permissions::ReadOnly).unwrap();
    let cached = cached.read();
    assert_eq!(cached.is_dirty(), None);
    assert_eq!(cached.page_data(), original.page_data());
}

#[test]
fn test_buffer_pool_transaction_complete() {
    let fx = create_fixture(4, 2);
    let pool = fx.db.buffer_pool();
    let committer = TransactionId::new();
    let aborter = TransactionId::new();

    dirty_page(&fx, committer, page(0), 1);
    dirty_page(&fx, aborter, page(1), 2);

    pool.transaction_complete(committer, true).unwrap();
    pool.transaction_complete(aborter, false).unwrap();

    assert_eq!(fx.file.read_page(page(0)).unwrap().tuples().count(), 1);
    assert_eq!(fx.file.read_page(page(1)).unwrap().tuples().count(), 0);
    assert_eq!(pool.lock_manager().locked_page_count(), 0);
}

#[test]
fn test_buffer_pool_lru_eviction_order() {
    let fx = create_fixture(3, 4);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();

    for n in 0..3 {
        pool.fetch(txn, page(n), Permissions::ReadOnly).unwrap();
    }
    assert_eq!(pool.resident_pages(), vec![page(0), page(1), page(2)]);

    // Touching page 0 makes page 1 the least recently used
    pool.fetch(txn, page(0), Permissions::ReadOnly).unwrap();
    pool.fetch(txn, page(3), Permissions::ReadOnly).unwrap();

    assert!(!pool.is_resident(page(1)));
    assert_eq!(pool.resident_pages(), vec![page(2), page(0), page(3)]);
}

#[test]
fn test_buffer_pool_eviction_skips_dirty_pages() {
    let fx = create_fixture(2, 3);
    let pool = fx.db.buffer_pool();
    let writer = TransactionId::new();
    let reader = TransactionId::new();

    dirty_page(&fx, writer, page(0), 5);
    pool.fetch(reader, page(1), Permissions::ReadOnly).unwrap();

    // Page 0 is older but dirty, so page 1 goes
    pool.fetch(reader, page(2), Permissions::ReadOnly).unwrap();
    assert!(pool.is_resident(page(0)));
    assert!(!pool.is_resident(page(1)));
    assert!(pool.is_resident(page(2)));
}

#[test]
fn test_buffer_pool_eviction_never_writes() {
    let fx = create_fixture(2, 8);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();
    let writes = fx.file.disk_manager().num_writes();

    for n in 0..8 {
        pool.fetch(txn, page(n), Permissions::ReadOnly).unwrap();
    }

    assert_eq!(pool.resident_count(), 2);
    assert_eq!(fx.file.disk_manager().num_writes(), writes);
}

#[test]
fn test_buffer_pool_capacity_bound_random_access() {
    let fx = create_fixture(4, 16);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let n = rng.gen_range(0..16);
        pool.fetch(txn, page(n), Permissions::ReadOnly).unwrap();
        assert!(pool.resident_count() <= pool.capacity());
        assert_eq!(pool.resident_pages().last(), Some(&page(n)));
    }
}

#[test]
fn test_buffer_pool_flush_page_and_flush_all() {
    let fx = create_fixture(4, 2);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    assert!(!pool.flush_page(page(0)).unwrap());

    dirty_page(&fx, t1, page(0), 1);
    dirty_page(&fx, t2, page(1), 2);
    let writes = fx.file.disk_manager().num_writes();

    assert!(pool.flush_page(page(0)).unwrap());
    assert!(!pool.flush_page(page(0)).unwrap());
    assert_eq!(fx.file.disk_manager().num_writes(), writes + 1);

    pool.flush_all().unwrap();
    assert_eq!(fx.file.disk_manager().num_writes(), writes + 2);
    assert_eq!(fx.file.read_page(page(1)).unwrap().tuples().count(), 1);

    // Flushing does not end the transactions
    assert!(pool.holds_lock(t1, page(0)));
    assert!(pool.holds_lock(t2, page(1)));
}

#[test]
fn test_buffer_pool_discard() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();

    dirty_page(&fx, txn, page(0), 4);
    assert!(pool.discard(page(0)));
    assert!(!pool.discard(page(0)));
    assert!(!pool.is_resident(page(0)));

    // The change is gone and commit has nothing to write
    pool.commit(txn).unwrap();
    assert_eq!(fx.file.read_page(page(0)).unwrap().tuples().count(), 0);
}

#[test]
fn test_buffer_pool_insert_and_delete_tuple() {
    let fx = create_fixture(4, 0);
    let pool = fx.db.buffer_pool();
    let txn = TransactionId::new();

    pool.insert_tuple(txn, TABLE, &Tuple::new(vec![7u8; TUPLE_SIZE]))
        .unwrap();
    assert_eq!(fx.file.num_pages(), 1);
    assert_eq!(
        pool.lock_manager().lock_mode(txn, page(0)),
        Some(LockMode::Exclusive)
    );

    let stored = pool.fetch(txn, page(0), Permissions::ReadOnly).unwrap();
    let tuple = stored.read().tuples().next().unwrap();
    assert_eq!(stored.read().is_dirty(), Some(txn));
    drop(stored);

    pool.delete_tuple(txn, &tuple).unwrap();
    pool.commit(txn).unwrap();
    assert_eq!(fx.file.read_page(page(0)).unwrap().tuples().count(), 0);

    let other = TransactionId::new();
    assert!(matches!(
        pool.delete_tuple(other, &Tuple::new(vec![0u8; TUPLE_SIZE])),
        Err(DbError::MissingRecordId)
    ));
}

#[test]
fn test_buffer_pool_release_page() {
    let fx = create_fixture(4, 1);
    let pool = fx.db.buffer_pool();
    let t1 = TransactionId::new();
    let t2 = TransactionId::new();

    pool.fetch(t1, page(0), Permissions::ReadOnly).unwrap();
    assert!(pool.holds_lock(t1, page(0)));

    pool.release_page(t1, page(0));
    assert!(!pool.holds_lock(t1, page(0)));

    // Nothing stands in the way of an exclusive lock now
    pool.fetch(t2, page(0), Permissions::ReadWrite).unwrap();
}
