use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{DbError, Result, TableId};
use crate::storage::PageStore;

#[derive(Default)]
struct Tables {
    stores: HashMap<TableId, Arc<dyn PageStore>>,
    names: HashMap<String, TableId>,
    /// Reverse of `names`
    ids: HashMap<TableId, String>,
}

/// Catalog maps table ids to their page stores and table names to ids.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table under `name` and returns its id.
    ///
    /// Re-registering a name replaces the previous table of that name, and
    /// re-registering an id replaces the previous store with that id.
    pub fn add_table(&self, store: Arc<dyn PageStore>, name: impl Into<String>) -> TableId {
        let name = name.into();
        let table_id = store.table_id();

        let mut tables = self.tables.write();
        if let Some(old_id) = tables.names.remove(&name) {
            tables.stores.remove(&old_id);
            tables.ids.remove(&old_id);
        }
        if let Some(old_name) = tables.ids.remove(&table_id) {
            tables.names.remove(&old_name);
        }

        tables.stores.insert(table_id, store);
        tables.names.insert(name.clone(), table_id);
        tables.ids.insert(table_id, name);
        debug!(table = table_id, "registered table");
        table_id
    }

    /// Returns the page store for a table.
    pub fn store(&self, table_id: TableId) -> Result<Arc<dyn PageStore>> {
        self.tables
            .read()
            .stores
            .get(&table_id)
            .cloned()
            .ok_or(DbError::TableNotFound(table_id))
    }

    /// Looks up a table id by name.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.tables
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| DbError::UnknownTable(name.to_string()))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.tables
            .read()
            .ids
            .get(&table_id)
            .cloned()
            .ok_or(DbError::TableNotFound(table_id))
    }

    /// Returns the ids of every registered table, in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().stores.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
