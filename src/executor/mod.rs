pub mod context;
pub mod ddl;
pub mod dml;
pub mod executor;
pub mod query;
pub mod sort;

pub use context::ExecutionContext;
pub use executor::{Executor, ExecutorPipeline};

use crate::core::{Params, Result};
use crate::parser::SqlParserAdapter;
use crate::parser::ast::Statement;
use crate::result::QueryResult;
use crate::storage::{Catalog, Change};
use std::sync::atomic::AtomicU64;

/// Parser plus executor pipeline for one in-memory database
#[derive(Default)]
pub struct SqlEngine {
    parser: SqlParserAdapter,
    pipeline: ExecutorPipeline,
}

impl SqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(pipeline: ExecutorPipeline) -> Self {
        Self {
            parser: SqlParserAdapter::new(),
            pipeline,
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Statement> {
        self.parser.parse_one(sql)
    }

    /// Run `stmt` against `catalog`, returning its result and the changes it
    /// applied. On error the catalog may hold part of the statement's writes;
    /// callers execute against a scratch copy.
    pub async fn execute(
        &self,
        stmt: &Statement,
        catalog: &mut Catalog,
        params: &Params,
        row_ids: &AtomicU64,
    ) -> Result<(QueryResult, Vec<Change>)> {
        let mut ctx = ExecutionContext::new(catalog, params, row_ids);
        let result = self.pipeline.execute(stmt, &mut ctx).await?;
        Ok((result, ctx.into_changes()))
    }
}

impl std::fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEngine").finish_non_exhaustive()
    }
}
