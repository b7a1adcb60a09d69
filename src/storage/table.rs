use crate::core::{Column, Result, Row, TxError};
use im::OrdMap;

/// Process-unique row identifier
pub type RowId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check arity, types and nullability, coercing where allowed.
    pub fn validate_row(&self, row: Row) -> Result<Row> {
        if row.len() != self.columns.len() {
            return Err(TxError::Execution(format!(
                "Table '{}' has {} columns, got {} values",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }

        self.columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                let value = column.data_type.coerce(value);
                column.validate(&value)?;
                Ok(value)
            })
            .collect()
    }
}

/// Rows of one table, keyed by row id.
///
/// Backed by a persistent map: cloning a table is O(1) and clones share
/// structure until written.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: OrdMap<RowId, Row>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: OrdMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn insert(&mut self, id: RowId, row: Row) {
        self.rows.insert(id, row);
    }

    /// Replace a row. Returns false if it no longer exists.
    pub fn update(&mut self, id: RowId, row: Row) -> bool {
        match self.rows.get_mut(&id) {
            Some(existing) => {
                *existing = row;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: RowId) -> bool {
        self.rows.remove(&id).is_some()
    }

    /// Rows in insertion order
    pub fn scan(&self) -> impl Iterator<Item = (RowId, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
