use async_trait::async_trait;
use crate::connection::Statement;
use crate::core::Result;
use crate::result::QueryResult;
use crate::transaction::IsolationLevel;

/// The boundary to a relational backend.
///
/// The propagation engine only ever talks to a database through this trait.
/// [`crate::storage::MemoryDriver`] implements it for `memory://` URLs; a wrapper
/// around a real client (Postgres, SQLite, ...) can implement it for production use.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Whether `begin` accepts this isolation level.
    fn supports_isolation(&self, level: IsolationLevel) -> bool;

    /// Open a new connection. Connections start in auto-commit mode.
    async fn connect(&self) -> Result<Box<dyn DriverConnection>>;
}

/// One live connection owned by exactly one session.
#[async_trait]
pub trait DriverConnection: Send {
    /// Start a transaction, optionally overriding the isolation level.
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Execute one statement with its named parameters bound.
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult>;

    /// Check that the connection is usable.
    async fn ping(&mut self) -> Result<()>;

    /// Release the connection without issuing COMMIT or ROLLBACK.
    ///
    /// What happens to an open transaction is backend-defined; the memory
    /// backend discards it.
    async fn close(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;
}
