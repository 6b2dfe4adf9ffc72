use heapdb::common::DatabaseConfig;
use heapdb::tuple::Tuple;
use heapdb::Database;

fn main() {
    tracing_subscriber::fmt::init();

    println!("HeapDB - a page-locking transactional heap store in Rust");
    println!("========================================================\n");

    // Create a scratch database directory for demonstration
    let db_dir = "heapdb_demo";

    let config = DatabaseConfig::default().with_buffer_pool_pages(8);
    let db = Database::open(db_dir, config).expect("Failed to open database");
    println!("Opened database in: {}", db_dir);

    let table = db
        .create_table("greetings", format!("{}/greetings.dat", db_dir), 16)
        .expect("Failed to create table");
    println!("Created table 'greetings' with id {}\n", table);

    // Insert some tuples and commit them
    {
        let mut txn = db.begin();
        let rows = [
            b"Hello, World!   ".as_slice(),
            b"This is HeapDB  ",
            b"Pages are locked",
        ];

        for row in &rows {
            txn.insert_tuple(table, &Tuple::new(row.to_vec()))
                .expect("Failed to insert tuple");
        }
        txn.commit().expect("Failed to commit");
        println!("Committed {} as {}", txn.id(), txn.state());
    }

    // Insert a tuple and roll it back
    {
        let mut txn = db.begin();
        txn.insert_tuple(table, &Tuple::new(b"never visible   ".to_vec()))
            .expect("Failed to insert tuple");
        txn.abort().expect("Failed to abort");
        println!("Rolled back {} as {}", txn.id(), txn.state());
    }

    // Read the data back
    {
        let mut txn = db.begin();
        let tuples = txn.scan(table).expect("Failed to scan table");

        println!("\nReading back table {}:", table);
        for tuple in &tuples {
            println!(
                "  - {:?}: {:?}",
                tuple.record_id(),
                String::from_utf8_lossy(tuple.data())
            );
        }
        txn.commit().expect("Failed to commit reader");
    }

    println!("\nBuffer pool:");
    println!("  - Resident pages: {}", db.buffer_pool().resident_count());
    println!("  - Capacity: {}", db.buffer_pool().capacity());

    // Clean up
    drop(db);
    std::fs::remove_dir_all(db_dir).ok();
    println!("\nDemo completed successfully!");
}
