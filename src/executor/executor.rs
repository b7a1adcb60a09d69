use super::ExecutionContext;
use super::ddl::{CreateTableExecutor, DropTableExecutor};
use super::dml::{DeleteExecutor, InsertExecutor, UpdateExecutor};
use super::query::SelectExecutor;
use crate::core::{Result, TxError};
use crate::parser::ast::Statement;
use crate::result::QueryResult;

use async_trait::async_trait;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Name for debug logs
    fn name(&self) -> &'static str;

    fn can_handle(&self, stmt: &Statement) -> bool;

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult>;
}

pub struct ExecutorPipeline {
    executors: Vec<Box<dyn Executor>>,
}

impl ExecutorPipeline {
    pub fn new() -> Self {
        Self {
            executors: Vec::new(),
        }
    }

    pub fn with_default_executors() -> Self {
        let mut pipeline = Self::new();
        pipeline.register(Box::new(CreateTableExecutor));
        pipeline.register(Box::new(DropTableExecutor));
        pipeline.register(Box::new(InsertExecutor));
        pipeline.register(Box::new(UpdateExecutor));
        pipeline.register(Box::new(DeleteExecutor));
        pipeline.register(Box::new(SelectExecutor));
        pipeline
    }

    pub fn register(&mut self, executor: Box<dyn Executor>) {
        self.executors.push(executor);
    }

    pub async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        for executor in &self.executors {
            if executor.can_handle(stmt) {
                log::trace!("Executing statement with {}", executor.name());
                return executor.execute(stmt, ctx).await;
            }
        }

        Err(TxError::UnsupportedOperation(
            "No executor found for statement".into(),
        ))
    }
}

impl Default for ExecutorPipeline {
    fn default() -> Self {
        Self::with_default_executors()
    }
}

/// Error for an executor handed a statement it did not claim.
pub(crate) fn mismatched(executor: &str) -> TxError {
    TxError::Execution(format!("{} executor received a foreign statement", executor))
}
