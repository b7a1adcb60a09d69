use thiserror::Error;

/// Errors raised by the propagation engine, the session layer and the
/// in-memory backend.
#[derive(Error, Debug)]
pub enum TxError {
    /// The engine target is unreachable or the connection string is malformed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend refused to open a transaction (e.g. unsupported isolation level).
    #[error("Transaction start error: {0}")]
    TransactionStart(String),

    #[error("MANDATORY propagation requires an active transaction")]
    Mandatory,

    #[error("NEVER propagation forbids an active transaction")]
    Never,

    /// Registry sequencing violated: push over an active frame, pop with none active.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Multiple results: {0}")]
    MultipleResults(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid sort field: {0}")]
    InvalidSortField(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TxError>;

impl TxError {
    /// True for the two propagation-contract violations.
    pub fn is_propagation_violation(&self) -> bool {
        matches!(self, Self::Mandatory | Self::Never)
    }
}

impl<T> From<std::sync::PoisonError<T>> for TxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

/// A failure type that can flow out of an intercepted body.
///
/// Engine errors are lifted into the caller's error type through `From<TxError>`,
/// so a body and the engine share one error channel. `as_error` exposes the
/// failure for rollback classification (see [`crate::transaction::RollbackRule`]).
pub trait Failure: From<TxError> + Send + 'static {
    fn as_error(&self) -> &(dyn std::error::Error + 'static);
}

impl Failure for TxError {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

impl Failure for anyhow::Error {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        self.as_ref()
    }
}
