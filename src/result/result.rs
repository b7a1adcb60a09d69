use crate::core::{Record, Result, Row, TxError, Value};

/// Raw outcome of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows inserted, updated or deleted by a DML statement.
    pub rows_affected: usize,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as field-keyed records, in result order.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| Record::new(&self.columns, row.clone()))
            .collect()
    }

    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| Record::new(&columns, row))
            .collect()
    }

    /// Exactly one row with exactly one column.
    pub fn scalar_one(&self) -> Result<&Value> {
        match self.rows.as_slice() {
            [] => Err(TxError::Execution("Expected one row, got none".into())),
            [row] => match row.as_slice() {
                [value] => Ok(value),
                _ => Err(TxError::MultipleResults(format!(
                    "Expected a single column, got {}",
                    row.len()
                ))),
            },
            rows => Err(TxError::MultipleResults(format!(
                "Expected one row, got {}",
                rows.len()
            ))),
        }
    }
}
