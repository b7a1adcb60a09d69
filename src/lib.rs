// ============================================================================
// txscope: declarative transaction propagation and query execution
// ============================================================================

//! Declarative transaction management over a pluggable relational driver.
//!
//! A method is described by a [`MethodTxSpec`] (propagation mode, read-only
//! flag, isolation level, rollback rules). The [`SessionManager`] runs the
//! method's body inside the session/transaction that description calls for: it joins
//! the caller's transaction, opens a new one, suspends the caller's, or runs
//! without one. Commit, rollback and close follow from how the body ends.
//!
//! Query methods are declared with a [`QueryDescriptor`] and executed by a
//! [`Repository`] against the session of the surrounding transaction.
//!
//! ```no_run
//! use txscope::{DatabaseSettings, MethodTxSpec, Propagation, SessionManager, TxContext, TxError};
//!
//! # async fn demo() -> Result<(), TxError> {
//! let manager = SessionManager::builder(DatabaseSettings::new("memory://app"))
//!     .build()
//!     .await?;
//! let ctx = TxContext::new();
//!
//! let spec = MethodTxSpec::new().propagation(Propagation::RequiresNew);
//! manager
//!     .transaction(&ctx, &spec, |scope| async move {
//!         scope.session()?.query("CREATE TABLE audit (msg TEXT)").await?;
//!         Ok::<_, TxError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod configurer;
pub mod connection;
pub mod core;
pub mod executor;
pub mod expression;
pub mod interface;
pub mod parser;
pub mod query;
pub mod result;
pub mod storage;
pub mod transaction;

pub use configurer::DatabaseConfigurer;
pub use connection::{DatabaseSettings, EngineHandle, PoolStats, Session, SessionId, Statement};
pub use core::{DataType, Failure, Params, Record, Result, TxError, Value};
pub use interface::{Driver, DriverConnection};
pub use query::{
    Direction, EntityMeta, FromRecord, Page, PageRequest, QueryDescriptor, QueryOutcome, Repository,
    RepositoryMeta, Sort,
};
pub use result::QueryResult;
pub use storage::{MemoryDatabase, MemoryDriver};
pub use transaction::{
    IsolationLevel, MethodKey, MethodRegistry, MethodTxSpec, Propagation, RollbackRule, SessionManager,
    TransactionalInterceptor, TxContext, TxScope,
};
