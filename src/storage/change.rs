// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write is recorded as a Change. A statement applies its changes to the
// session's working view; COMMIT replays the transaction's log onto the latest
// committed catalog, ROLLBACK drops the log.
//
// ============================================================================

use super::table::{RowId, TableSchema};
use crate::core::Row;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertRow { table: String, id: RowId, row: Row },
    UpdateRow { table: String, id: RowId, row: Row },
    DeleteRow { table: String, id: RowId },
    CreateTable { schema: TableSchema },
    DropTable { name: String },
}

impl Change {
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
            Change::CreateTable { schema } => schema.name(),
            Change::DropTable { name } => name,
        }
    }

    pub fn is_ddl(&self) -> bool {
        matches!(self, Change::CreateTable { .. } | Change::DropTable { .. })
    }
}
