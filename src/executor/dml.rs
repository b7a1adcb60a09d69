use super::executor::mismatched;
use super::{ExecutionContext, Executor};
use crate::core::{Result, Row, TxError, Value};
use crate::expression::{Evaluator, RowScope};
use crate::parser::ast::{DeleteStmt, Expr, InsertStmt, Statement, UpdateStmt};
use crate::result::QueryResult;
use crate::storage::{Change, RowId, TableSchema};

use async_trait::async_trait;

pub struct InsertExecutor;

#[async_trait]
impl Executor for InsertExecutor {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Insert(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Insert(insert) = stmt else {
            return Err(mismatched(self.name()));
        };
        self.execute_insert(insert, ctx)
    }
}

impl InsertExecutor {
    fn execute_insert(&self, insert: &InsertStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let schema = ctx.catalog.table(&insert.table_name)?.schema().clone();
        let positions = self.column_positions(insert, &schema)?;

        let evaluator = Evaluator::new(ctx.params);
        let rows = insert
            .values
            .iter()
            .map(|exprs| self.evaluate_row(exprs, &positions, &schema, &evaluator))
            .collect::<Result<Vec<_>>>()?;

        let inserted = rows.len();
        for row in rows {
            let id = ctx.next_row_id();
            ctx.record(Change::InsertRow {
                table: schema.name().to_string(),
                id,
                row,
            })?;
        }

        Ok(QueryResult::affected(inserted))
    }

    /// Schema index for each listed column, in VALUES order
    fn column_positions(&self, insert: &InsertStmt, schema: &TableSchema) -> Result<Vec<usize>> {
        match &insert.columns {
            None => Ok((0..schema.columns().len()).collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    schema.find_column_index(name).ok_or_else(|| {
                        TxError::ColumnNotFound(name.clone(), schema.name().to_string())
                    })
                })
                .collect(),
        }
    }

    fn evaluate_row(
        &self,
        exprs: &[Expr],
        positions: &[usize],
        schema: &TableSchema,
        evaluator: &Evaluator<'_>,
    ) -> Result<Row> {
        if exprs.len() != positions.len() {
            return Err(TxError::Execution(format!(
                "INSERT into '{}' lists {} columns but {} values",
                schema.name(),
                positions.len(),
                exprs.len()
            )));
        }

        // Unlisted columns default to NULL
        let mut row = vec![Value::Null; schema.columns().len()];
        for (expr, &position) in exprs.iter().zip(positions) {
            row[position] = evaluator.eval(expr, &RowScope::empty())?;
        }

        schema.validate_row(row)
    }
}

pub struct UpdateExecutor;

#[async_trait]
impl Executor for UpdateExecutor {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Update(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Update(update) = stmt else {
            return Err(mismatched(self.name()));
        };
        self.execute_update(update, ctx)
    }
}

impl UpdateExecutor {
    fn execute_update(&self, update: &UpdateStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let table = ctx.catalog.table(&update.table_name)?;
        let schema = table.schema().clone();
        let columns = schema.column_names();

        let targets = update
            .assignments
            .iter()
            .map(|assignment| {
                schema
                    .find_column_index(&assignment.column)
                    .map(|idx| (idx, &assignment.value))
                    .ok_or_else(|| {
                        TxError::ColumnNotFound(assignment.column.clone(), schema.name().to_string())
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let evaluator = Evaluator::new(ctx.params);
        let mut updates: Vec<(RowId, Row)> = Vec::new();
        for (id, row) in table.scan() {
            let scope = RowScope::new(schema.name(), &columns, row);
            if let Some(predicate) = &update.selection {
                if !evaluator.matches(predicate, &scope)? {
                    continue;
                }
            }

            // Every assignment sees the row as it was before the update
            let mut new_row = row.clone();
            for (idx, expr) in &targets {
                new_row[*idx] = evaluator.eval(expr, &scope)?;
            }
            updates.push((id, schema.validate_row(new_row)?));
        }

        let updated = updates.len();
        for (id, row) in updates {
            ctx.record(Change::UpdateRow {
                table: schema.name().to_string(),
                id,
                row,
            })?;
        }

        Ok(QueryResult::affected(updated))
    }
}

pub struct DeleteExecutor;

#[async_trait]
impl Executor for DeleteExecutor {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Delete(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Delete(delete) = stmt else {
            return Err(mismatched(self.name()));
        };
        self.execute_delete(delete, ctx)
    }
}

impl DeleteExecutor {
    fn execute_delete(&self, delete: &DeleteStmt, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let table = ctx.catalog.table(&delete.table_name)?;
        let table_name = table.schema().name().to_string();
        let columns = table.schema().column_names();

        let evaluator = Evaluator::new(ctx.params);
        let mut doomed = Vec::new();
        for (id, row) in table.scan() {
            let matched = match &delete.selection {
                Some(predicate) => {
                    evaluator.matches(predicate, &RowScope::new(&table_name, &columns, row))?
                }
                None => true,
            };
            if matched {
                doomed.push(id);
            }
        }

        let deleted = doomed.len();
        for id in doomed {
            ctx.record(Change::DeleteRow {
                table: table_name.clone(),
                id,
            })?;
        }

        Ok(QueryResult::affected(deleted))
    }
}
