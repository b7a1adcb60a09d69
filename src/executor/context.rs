use crate::core::{Params, Result};
use crate::storage::{Catalog, Change};
use std::sync::atomic::{AtomicU64, Ordering};

/// State one statement executes against.
///
/// Writes go through [`ExecutionContext::record`], which applies the change to
/// the working catalog and keeps it for the caller's transaction log.
pub struct ExecutionContext<'a> {
    pub catalog: &'a mut Catalog,
    pub params: &'a Params,
    row_ids: &'a AtomicU64,
    changes: Vec<Change>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(catalog: &'a mut Catalog, params: &'a Params, row_ids: &'a AtomicU64) -> Self {
        Self {
            catalog,
            params,
            row_ids,
            changes: Vec::new(),
        }
    }

    pub fn next_row_id(&self) -> u64 {
        self.row_ids.fetch_add(1, Ordering::SeqCst)
    }

    pub fn record(&mut self, change: Change) -> Result<()> {
        self.catalog.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}
