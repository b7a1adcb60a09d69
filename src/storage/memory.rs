// ============================================================================
// In-memory relational backend
// ============================================================================
//
// One MemoryDatabase holds the committed catalog. A connection outside a
// transaction executes each statement against a copy of the committed state
// and swaps the copy in (auto-commit). Inside a transaction, statements run
// against a private working view and append to a change log; COMMIT replays
// the log onto the latest committed state.
//
// ============================================================================

use super::catalog::Catalog;
use super::change::Change;
use crate::connection::{DatabaseSettings, Statement};
use crate::core::{Result, TxError};
use crate::executor::SqlEngine;
use crate::interface::{Driver, DriverConnection};
use crate::result::QueryResult;
use crate::transaction::IsolationLevel;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

lazy_static::lazy_static! {
    /// Named databases shared by every engine in the process
    static ref NAMED_DATABASES: Mutex<HashMap<String, Arc<MemoryDatabase>>> =
        Mutex::new(HashMap::new());
}

#[derive(Debug)]
pub struct MemoryDatabase {
    name: Option<String>,
    committed: RwLock<Catalog>,
    row_ids: AtomicU64,
    engine: SqlEngine,
}

impl MemoryDatabase {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            committed: RwLock::new(Catalog::new()),
            row_ids: AtomicU64::new(1),
            engine: SqlEngine::new(),
        }
    }

    /// A database no other engine can reach
    pub fn private() -> Arc<Self> {
        Arc::new(Self::new(None))
    }

    /// The process-wide database called `name`, created on first use
    pub fn named(name: &str) -> Arc<Self> {
        let mut registry = NAMED_DATABASES
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(registry.entry(name.to_string()).or_insert_with(|| {
            log::debug!("Creating in-memory database '{}'", name);
            Arc::new(Self::new(Some(name.to_string())))
        }))
    }

    /// Remove `name` from the registry. Engines already holding it keep
    /// their data; the next `named(name)` starts empty.
    pub fn forget(name: &str) -> bool {
        NAMED_DATABASES
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Copy of the committed state
    pub async fn committed(&self) -> Catalog {
        self.committed.read().await.clone()
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.committed.read().await.list_tables()
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<private>")
    }
}

/// Driver for `memory://` URLs
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    database: Arc<MemoryDatabase>,
}

impl MemoryDriver {
    /// Driver over a fresh private database
    pub fn new() -> Self {
        Self {
            database: MemoryDatabase::private(),
        }
    }

    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self> {
        let database = match settings.database_name()? {
            Some(name) => MemoryDatabase::named(&name),
            None => MemoryDatabase::private(),
        };
        Ok(Self { database })
    }

    pub fn with_database(database: Arc<MemoryDatabase>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports_isolation(&self, level: IsolationLevel) -> bool {
        !matches!(level, IsolationLevel::ReadUncommitted)
    }

    async fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(MemoryConnection::new(Arc::clone(&self.database))))
    }
}

/// Open transaction on a memory connection
#[derive(Debug)]
struct TxnState {
    isolation: IsolationLevel,
    /// Begin-time snapshot plus own writes, for snapshot isolation levels
    snapshot: Option<Catalog>,
    changes: Vec<Change>,
}

#[derive(Debug)]
pub struct MemoryConnection {
    db: Arc<MemoryDatabase>,
    txn: Option<TxnState>,
    closed: bool,
}

impl MemoryConnection {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            txn: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TxError::Connection("Connection is closed".into()));
        }
        Ok(())
    }

    async fn execute_autocommit(&self, statement: &Statement) -> Result<QueryResult> {
        let parsed = self.db.engine.parse(&statement.sql)?;

        if !parsed.is_write() {
            let mut view = self.db.committed().await;
            let (result, _) = self
                .db
                .engine
                .execute(&parsed, &mut view, &statement.params, &self.db.row_ids)
                .await?;
            return Ok(result);
        }

        let mut committed = self.db.committed.write().await;
        let mut working = committed.clone();
        let (result, changes) = self
            .db
            .engine
            .execute(&parsed, &mut working, &statement.params, &self.db.row_ids)
            .await?;
        *committed = working;
        log::trace!(
            "Auto-committed {} change(s) to '{}'",
            changes.len(),
            self.db.label()
        );
        Ok(result)
    }

    async fn execute_in_transaction(&mut self, statement: &Statement) -> Result<QueryResult> {
        let parsed = self.db.engine.parse(&statement.sql)?;
        let Some(txn) = self.txn.as_mut() else {
            return Err(TxError::Execution("No transaction in progress".into()));
        };

        // Snapshot levels keep a maintained view; READ COMMITTED rebuilds it
        // from the latest committed state plus the log.
        let mut working = match &txn.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => {
                let mut view = self.db.committed().await;
                view.apply_all(&txn.changes)?;
                view
            }
        };

        let (result, changes) = self
            .db
            .engine
            .execute(&parsed, &mut working, &statement.params, &self.db.row_ids)
            .await?;

        if txn.snapshot.is_some() {
            txn.snapshot = Some(working);
        }
        txn.changes.extend(changes);
        Ok(result)
    }
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(TxError::TransactionStart(
                "A transaction is already in progress".into(),
            ));
        }

        let isolation = isolation.unwrap_or_default();
        if isolation == IsolationLevel::ReadUncommitted {
            return Err(TxError::TransactionStart(format!(
                "Isolation level {} is not supported by the memory backend",
                isolation
            )));
        }

        let snapshot = if isolation.uses_snapshot() {
            Some(self.db.committed().await)
        } else {
            None
        };

        log::trace!("BEGIN {} on '{}'", isolation, self.db.label());
        self.txn = Some(TxnState {
            isolation,
            snapshot,
            changes: Vec::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some(txn) = self.txn.take() else {
            return Err(TxError::Execution("No transaction in progress".into()));
        };

        if txn.changes.is_empty() {
            return Ok(());
        }

        let mut committed = self.db.committed.write().await;
        let mut merged = committed.clone();
        merged.apply_all(&txn.changes)?;
        *committed = merged;

        log::trace!(
            "COMMIT {} change(s) ({}) to '{}'",
            txn.changes.len(),
            txn.isolation,
            self.db.label()
        );
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(txn) = self.txn.take() {
            log::trace!(
                "ROLLBACK discarded {} change(s) on '{}'",
                txn.changes.len(),
                self.db.label()
            );
        }
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult> {
        self.ensure_open()?;
        if self.txn.is_some() {
            self.execute_in_transaction(statement).await
        } else {
            self.execute_autocommit(statement).await
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(txn) = self.txn.take() {
            if !txn.changes.is_empty() {
                log::debug!(
                    "Closing connection with an open transaction: {} change(s) discarded",
                    txn.changes.len()
                );
            }
        }
        self.closed = true;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    async fn connection(db: &Arc<MemoryDatabase>) -> MemoryConnection {
        let mut conn = MemoryConnection::new(Arc::clone(db));
        conn.execute(&Statement::new("CREATE TABLE t (id INTEGER NOT NULL, v TEXT)"))
            .await
            .ok();
        conn
    }

    async fn count(conn: &mut MemoryConnection) -> Value {
        let result = conn.execute(&Statement::new("SELECT COUNT(*) FROM t")).await.unwrap();
        result.scalar_one().unwrap().clone()
    }

    #[tokio::test]
    async fn test_autocommit_is_visible_to_others() {
        let db = MemoryDatabase::private();
        let mut a = connection(&db).await;
        let mut b = connection(&db).await;

        a.execute(&Statement::new("INSERT INTO t VALUES (1, 'x')")).await.unwrap();
        assert_eq!(count(&mut b).await, Value::Integer(1));
    }

    #[tokio::test]
    async fn test_rollback_and_close_discard() {
        let db = MemoryDatabase::private();
        let mut a = connection(&db).await;

        a.begin(None).await.unwrap();
        a.execute(&Statement::new("INSERT INTO t VALUES (1, 'x')")).await.unwrap();
        assert_eq!(count(&mut a).await, Value::Integer(1));
        a.rollback().await.unwrap();
        assert_eq!(count(&mut a).await, Value::Integer(0));

        a.begin(None).await.unwrap();
        a.execute(&Statement::new("INSERT INTO t VALUES (2, 'y')")).await.unwrap();
        a.close().await.unwrap();
        assert_eq!(db.committed().await.table("t").unwrap().row_count(), 0);
        assert!(a.execute(&Statement::new("SELECT * FROM t")).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_autocommit_statement_leaves_no_trace() {
        let db = MemoryDatabase::private();
        let mut a = connection(&db).await;

        let err = a
            .execute(&Statement::new("INSERT INTO t VALUES (1, 'x'), (NULL, 'y')"))
            .await;
        assert!(matches!(err, Err(TxError::ConstraintViolation(_))));
        assert_eq!(count(&mut a).await, Value::Integer(0));
    }

    #[tokio::test]
    async fn test_disjoint_commits_merge() {
        let db = MemoryDatabase::private();
        let mut a = connection(&db).await;
        let mut b = connection(&db).await;

        a.begin(None).await.unwrap();
        b.begin(None).await.unwrap();
        a.execute(&Statement::new("INSERT INTO t VALUES (1, 'a')")).await.unwrap();
        b.execute(&Statement::new("INSERT INTO t VALUES (2, 'b')")).await.unwrap();
        a.commit().await.unwrap();
        b.commit().await.unwrap();

        assert_eq!(count(&mut a).await, Value::Integer(2));
    }

    #[tokio::test]
    async fn test_isolation_levels() {
        let db = MemoryDatabase::private();
        let mut writer = connection(&db).await;
        let mut reader = connection(&db).await;

        reader.begin(Some(IsolationLevel::RepeatableRead)).await.unwrap();
        assert_eq!(count(&mut reader).await, Value::Integer(0));
        writer.execute(&Statement::new("INSERT INTO t VALUES (1, 'x')")).await.unwrap();
        assert_eq!(count(&mut reader).await, Value::Integer(0));
        reader.commit().await.unwrap();

        reader.begin(Some(IsolationLevel::ReadCommitted)).await.unwrap();
        writer.execute(&Statement::new("INSERT INTO t VALUES (2, 'y')")).await.unwrap();
        assert_eq!(count(&mut reader).await, Value::Integer(2));
        reader.commit().await.unwrap();

        assert!(matches!(
            reader.begin(Some(IsolationLevel::ReadUncommitted)).await,
            Err(TxError::TransactionStart(_))
        ));
    }

    #[tokio::test]
    async fn test_named_databases_are_shared() {
        let settings = DatabaseSettings::new("memory://memory_rs_shared_test");
        let first = MemoryDriver::from_settings(&settings).unwrap();
        let second = MemoryDriver::from_settings(&settings).unwrap();
        assert!(Arc::ptr_eq(first.database(), second.database()));

        let private = MemoryDriver::from_settings(&DatabaseSettings::new("memory://")).unwrap();
        assert!(!Arc::ptr_eq(first.database(), private.database()));
        assert!(MemoryDatabase::forget("memory_rs_shared_test"));
    }

    #[tokio::test]
    async fn test_nested_begin_fails() {
        let db = MemoryDatabase::private();
        let mut a = connection(&db).await;
        a.begin(None).await.unwrap();
        assert!(matches!(a.begin(None).await, Err(TxError::TransactionStart(_))));
        assert!(a.in_transaction());
    }
}
