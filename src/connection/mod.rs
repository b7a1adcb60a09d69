pub mod config;
pub mod pool;

use crate::core::{Params, Result, TxError, Value};
use crate::interface::DriverConnection;
use crate::result::QueryResult;
use crate::transaction::IsolationLevel;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedSemaphorePermit};

pub use config::DatabaseSettings;
pub use pool::{EngineHandle, PoolStats};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// SQL text plus named parameters
///
/// Parameters are referenced in the text as `:name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.set(name, value);
        self
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let bound: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| format!(":{}={}", name, value))
                .collect();
            write!(f, " [{}]", bound.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, statements auto-commit
    Active,
    /// Open with a transaction in progress
    InTransaction,
    Closed,
}

/// Handle to one live database session.
///
/// Cloning a `Session` shares the same underlying connection; the connection is
/// released when the session is closed or the last handle is dropped. A frame
/// owns its session exclusively: handles are only ever shared with calls that
/// joined that frame.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    echo: bool,
    conn: Mutex<SessionConn>,
}

struct SessionConn {
    connection: Box<dyn DriverConnection>,
    state: SessionState,
    /// Pool slot held while the session is open
    permit: Option<OwnedSemaphorePermit>,
}

impl Session {
    pub(crate) fn new(
        connection: Box<dyn DriverConnection>,
        permit: Option<OwnedSemaphorePermit>,
        echo: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::next(),
                echo,
                conn: Mutex::new(SessionConn {
                    connection,
                    state: SessionState::Active,
                    permit,
                }),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// True when both handles refer to the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.conn.lock().await.state
    }

    pub async fn is_in_transaction(&self) -> bool {
        self.state().await == SessionState::InTransaction
    }

    /// Execute one statement on this session
    pub async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        let mut conn = self.inner.conn.lock().await;
        if conn.state == SessionState::Closed {
            return Err(TxError::Execution(format!("{} is closed", self.inner.id)));
        }

        if self.inner.echo {
            log::info!("[{}] {}", self.inner.id, statement);
        }

        conn.connection.execute(statement).await
    }

    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.execute(&Statement::new(sql)).await
    }

    pub async fn query_with(&self, sql: &str, params: Params) -> Result<QueryResult> {
        self.execute(&Statement::with_params(sql, params)).await
    }

    pub(crate) async fn begin(&self, isolation: Option<IsolationLevel>) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        match conn.state {
            SessionState::Closed => {
                return Err(TxError::TransactionStart(format!("{} is closed", self.inner.id)));
            }
            SessionState::InTransaction => {
                return Err(TxError::TransactionStart(format!(
                    "{} already has a transaction in progress",
                    self.inner.id
                )));
            }
            SessionState::Active => {}
        }

        conn.connection.begin(isolation).await?;
        conn.state = SessionState::InTransaction;
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        if conn.state != SessionState::InTransaction {
            return Err(TxError::Execution(format!(
                "{} has no transaction to commit",
                self.inner.id
            )));
        }

        let outcome = conn.connection.commit().await;
        // A failed commit leaves nothing to retry against
        conn.state = SessionState::Active;
        outcome
    }

    pub async fn rollback(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        if conn.state != SessionState::InTransaction {
            return Ok(());
        }

        let outcome = conn.connection.rollback().await;
        conn.state = SessionState::Active;
        outcome
    }

    /// Release the connection without ending an open transaction explicitly.
    ///
    /// Closing twice is a no-op. The pool slot is freed even if the driver
    /// reports an error.
    pub async fn close(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        if conn.state == SessionState::Closed {
            return Ok(());
        }

        let outcome = conn.connection.close().await;
        conn.state = SessionState::Closed;
        conn.permit.take();
        outcome
    }

    pub(crate) async fn ping(&self) -> Result<()> {
        let mut conn = self.inner.conn.lock().await;
        conn.connection.ping().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.inner.id).finish()
    }
}
