use super::executor::mismatched;
use super::{ExecutionContext, Executor};
use crate::core::{Column, Result, TxError};
use crate::parser::ast::{CreateTableStmt, DropTableStmt, Statement};
use crate::result::QueryResult;
use crate::storage::{Change, TableSchema};

use async_trait::async_trait;
use std::collections::HashSet;

pub struct CreateTableExecutor;

#[async_trait]
impl Executor for CreateTableExecutor {
    fn name(&self) -> &'static str {
        "CREATE_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::CreateTable(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::CreateTable(create) = stmt else {
            return Err(mismatched(self.name()));
        };
        self.execute_create_table(create, ctx)
    }
}

impl CreateTableExecutor {
    fn execute_create_table(&self, create: &CreateTableStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        if ctx.catalog.table_exists(&create.table_name) {
            if create.if_not_exists {
                return Ok(QueryResult::empty());
            }
            return Err(TxError::TableExists(create.table_name.clone()));
        }

        let mut seen = HashSet::new();
        let columns = create
            .columns
            .iter()
            .map(|def| {
                if !seen.insert(def.name.to_ascii_lowercase()) {
                    return Err(TxError::Execution(format!(
                        "Duplicate column '{}' in table '{}'",
                        def.name, create.table_name
                    )));
                }
                let column = Column::new(def.name.clone(), def.data_type);
                Ok(if def.nullable { column } else { column.not_null() })
            })
            .collect::<Result<Vec<_>>>()?;

        ctx.record(Change::CreateTable {
            schema: TableSchema::new(create.table_name.clone(), columns),
        })?;
        Ok(QueryResult::empty())
    }
}

pub struct DropTableExecutor;

#[async_trait]
impl Executor for DropTableExecutor {
    fn name(&self) -> &'static str {
        "DROP_TABLE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::DropTable(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::DropTable(drop) = stmt else {
            return Err(mismatched(self.name()));
        };
        self.execute_drop_table(drop, ctx)
    }
}

impl DropTableExecutor {
    fn execute_drop_table(&self, drop: &DropTableStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        if !ctx.catalog.table_exists(&drop.table_name) {
            if drop.if_exists {
                return Ok(QueryResult::empty());
            }
            return Err(TxError::TableNotFound(drop.table_name.clone()));
        }

        ctx.record(Change::DropTable {
            name: drop.table_name.clone(),
        })?;
        Ok(QueryResult::empty())
    }
}
