// ============================================================================
// Transaction Propagation Engine
// ============================================================================
//
// - propagation: the mode x active-frame decision table
// - context:     per-task registry holding at most one active frame
// - manager:     runs a body through decide / open / finalize / restore
// - interceptor: explicit method metadata and call interception
//
// ============================================================================

pub mod context;
pub mod frame;
pub mod interceptor;
pub mod isolation;
pub mod manager;
pub mod propagation;
pub mod spec;

pub use context::{TxContext, TxScope};
pub use frame::{FailureOutcome, RollbackPolicy, RollbackRule, TransactionFrame};
pub use interceptor::{MethodKey, MethodRegistry, TransactionalInterceptor};
pub use isolation::IsolationLevel;
pub use manager::{SessionManager, SessionManagerBuilder};
pub use propagation::{Action, FailKind, Propagation, decide};
pub use spec::MethodTxSpec;
