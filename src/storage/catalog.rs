use super::change::Change;
use super::table::{Table, TableSchema};
use crate::core::{Result, TxError};
use im::HashMap;

/// All tables of one database state.
///
/// Cheap to clone: a transaction snapshot or statement view is a clone that
/// shares structure with the committed catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&key(name))
            .ok_or_else(|| TxError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&key(name))
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .values()
            .map(|t| t.schema().name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = key(schema.name());
        if self.tables.contains_key(&name) {
            return Err(TxError::TableExists(schema.name().to_string()));
        }
        self.tables.insert(name, Table::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> bool {
        self.tables.remove(&key(name)).is_some()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(&key(name))
            .ok_or_else(|| TxError::TableNotFound(name.to_string()))
    }

    /// Apply one change.
    ///
    /// Updates and deletes of rows that no longer exist are skipped: when a
    /// log is replayed at commit, a concurrent transaction may have removed
    /// them first.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::InsertRow { table, id, row } => {
                self.table_mut(table)?.insert(*id, row.clone());
            }
            Change::UpdateRow { table, id, row } => {
                if !self.table_mut(table)?.update(*id, row.clone()) {
                    log::debug!("Row {} in '{}' vanished before update", id, table);
                }
            }
            Change::DeleteRow { table, id } => {
                self.table_mut(table)?.delete(*id);
            }
            Change::CreateTable { schema } => self.create_table(schema.clone())?,
            Change::DropTable { name } => {
                self.drop_table(name);
            }
        }
        Ok(())
    }

    pub fn apply_all<'a>(&mut self, changes: impl IntoIterator<Item = &'a Change>) -> Result<()> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}
