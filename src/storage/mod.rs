pub mod catalog;
pub mod change;
pub mod memory;
pub mod table;

pub use catalog::Catalog;
pub use change::Change;
pub use memory::{MemoryConnection, MemoryDatabase, MemoryDriver};
pub use table::{RowId, Table, TableSchema};
