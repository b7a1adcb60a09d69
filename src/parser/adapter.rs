// ============================================================================
// src/parser/adapter.rs - sqlparser AST -> our Statement
// ============================================================================

use super::ast::*;
use super::plugins::ExpressionConverter;
use crate::core::{DataType, Result, TxError};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

pub struct SqlParserAdapter {
    dialect: PostgreSqlDialect,
    expr_converter: ExpressionConverter,
}

impl SqlParserAdapter {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter: ExpressionConverter::new(),
        }
    }

    pub fn with_expression_converter(expr_converter: ExpressionConverter) -> Self {
        Self {
            dialect: PostgreSqlDialect {},
            expr_converter,
        }
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>> {
        let external_stmts =
            Parser::parse_sql(&self.dialect, sql).map_err(|e| TxError::Parse(e.to_string()))?;

        external_stmts
            .into_iter()
            .map(|stmt| self.convert_statement(stmt))
            .collect()
    }

    /// Parse text that must hold exactly one statement.
    pub fn parse_one(&self, sql: &str) -> Result<Statement> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(TxError::Parse("Empty statement".into())),
            n => Err(TxError::Parse(format!(
                "Expected one statement, got {}",
                n
            ))),
        }
    }

    fn convert_statement(&self, stmt: sql_ast::Statement) -> Result<Statement> {
        match stmt {
            sql_ast::Statement::CreateTable(create) => {
                Ok(Statement::CreateTable(self.convert_create_table(create)?))
            }
            sql_ast::Statement::Drop {
                object_type,
                names,
                if_exists,
                ..
            } => {
                if let sql_ast::ObjectType::Table = object_type {
                    Ok(Statement::DropTable(self.convert_drop_table(names, if_exists)?))
                } else {
                    Err(TxError::UnsupportedOperation(format!(
                        "Only DROP TABLE supported, got: {}",
                        object_type
                    )))
                }
            }
            sql_ast::Statement::Insert(insert) => Ok(Statement::Insert(self.convert_insert(insert)?)),
            sql_ast::Statement::Query(query) => Ok(Statement::Query(self.convert_query(*query)?)),
            sql_ast::Statement::Delete(delete) => Ok(Statement::Delete(self.convert_delete(delete)?)),
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Ok(Statement::Update(self.convert_update(table, assignments, selection)?)),
            other => Err(TxError::UnsupportedOperation(format!(
                "Statement type not supported: {}",
                other
            ))),
        }
    }

    fn convert_create_table(&self, create: sql_ast::CreateTable) -> Result<CreateTableStmt> {
        let table_name = extract_table_name(&create.name)?;
        let columns = create
            .columns
            .into_iter()
            .map(|col| self.convert_column_def(col))
            .collect::<Result<Vec<_>>>()?;

        Ok(CreateTableStmt {
            table_name,
            columns,
            if_not_exists: create.if_not_exists,
        })
    }

    fn convert_drop_table(&self, names: Vec<sql_ast::ObjectName>, if_exists: bool) -> Result<DropTableStmt> {
        let [name] = names.as_slice() else {
            return Err(TxError::UnsupportedOperation(
                "Only single table DROP supported".into(),
            ));
        };

        Ok(DropTableStmt {
            table_name: extract_table_name(name)?,
            if_exists,
        })
    }

    fn convert_column_def(&self, col: sql_ast::ColumnDef) -> Result<ColumnDef> {
        let data_type = self.convert_data_type(&col.data_type)?;
        let nullable = !col
            .options
            .iter()
            .any(|opt| matches!(opt.option, sql_ast::ColumnOption::NotNull));

        Ok(ColumnDef {
            name: col.name.value,
            data_type,
            nullable,
        })
    }

    fn convert_data_type(&self, dt: &sql_ast::DataType) -> Result<DataType> {
        match dt {
            sql_ast::DataType::Int(_)
            | sql_ast::DataType::Integer(_)
            | sql_ast::DataType::BigInt(_) => Ok(DataType::Integer),

            sql_ast::DataType::Float(_)
            | sql_ast::DataType::Double(_)
            | sql_ast::DataType::Real => Ok(DataType::Float),

            sql_ast::DataType::Text
            | sql_ast::DataType::Varchar(_)
            | sql_ast::DataType::Char(_)
            | sql_ast::DataType::String(_) => Ok(DataType::Text),

            sql_ast::DataType::Boolean | sql_ast::DataType::Bool => Ok(DataType::Boolean),

            _ => Err(TxError::TypeMismatch(format!("Unsupported data type: {}", dt))),
        }
    }

    fn convert_insert(&self, insert: sql_ast::Insert) -> Result<InsertStmt> {
        let table_name = insert.table.to_string();

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|id| id.value).collect())
        };

        let Some(source) = insert.source else {
            return Err(TxError::UnsupportedOperation("INSERT requires VALUES".into()));
        };
        let sql_ast::SetExpr::Values(vals) = *source.body else {
            return Err(TxError::UnsupportedOperation("Only VALUES clause supported".into()));
        };

        let values = vals
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|expr| self.expr_converter.convert(expr))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertStmt {
            table_name,
            columns,
            values,
        })
    }

    fn convert_delete(&self, delete: sql_ast::Delete) -> Result<DeleteStmt> {
        let tables = match delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) => tables,
            sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let Some(first) = tables.first() else {
            return Err(TxError::Parse("DELETE requires a table".into()));
        };
        let table_name = match &first.relation {
            sql_ast::TableFactor::Table { name, .. } => extract_table_name(name)?,
            _ => {
                return Err(TxError::UnsupportedOperation(
                    "Complex table references not supported in DELETE".into(),
                ));
            }
        };

        let selection = delete
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(DeleteStmt {
            table_name,
            selection,
        })
    }

    fn convert_update(
        &self,
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> Result<UpdateStmt> {
        let table_name = match table.relation {
            sql_ast::TableFactor::Table { name, .. } => extract_table_name(&name)?,
            _ => {
                return Err(TxError::UnsupportedOperation(
                    "Complex table references not supported in UPDATE".into(),
                ));
            }
        };

        let assignments = assignments
            .into_iter()
            .map(|assign| {
                let column = match assign.target {
                    sql_ast::AssignmentTarget::ColumnName(col_name) => extract_table_name(&col_name)?,
                    _ => {
                        return Err(TxError::UnsupportedOperation(
                            "Only simple column names supported in UPDATE".into(),
                        ));
                    }
                };
                let value = self.expr_converter.convert(assign.value)?;
                Ok(Assignment { column, value })
            })
            .collect::<Result<Vec<_>>>()?;

        let selection = selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(UpdateStmt {
            table_name,
            assignments,
            selection,
        })
    }

    fn convert_query(&self, query: sql_ast::Query) -> Result<QueryStmt> {
        if query.with.is_some() {
            return Err(TxError::UnsupportedOperation("WITH is not supported".into()));
        }

        let order_by = self.convert_order_by(query.order_by)?;
        let (limit, offset) = self.convert_limit_clause(query.limit_clause)?;

        let sql_ast::SetExpr::Select(select) = *query.body else {
            return Err(TxError::UnsupportedOperation("Only SELECT queries supported".into()));
        };
        let select = *select;

        if select.distinct.is_some() {
            return Err(TxError::UnsupportedOperation("DISTINCT is not supported".into()));
        }
        if select.having.is_some() {
            return Err(TxError::UnsupportedOperation("HAVING is not supported".into()));
        }
        if let sql_ast::GroupByExpr::Expressions(exprs, _) = &select.group_by {
            if !exprs.is_empty() {
                return Err(TxError::UnsupportedOperation("GROUP BY is not supported".into()));
            }
        }

        let projection = select
            .projection
            .into_iter()
            .map(|item| self.convert_select_item(item))
            .collect::<Result<Vec<_>>>()?;

        let mut from = select.from;
        let from = match from.len() {
            0 => None,
            1 => {
                let table = from.remove(0);
                if !table.joins.is_empty() {
                    return Err(TxError::UnsupportedOperation("JOIN is not supported".into()));
                }
                Some(self.convert_table_factor(table.relation)?)
            }
            _ => {
                return Err(TxError::UnsupportedOperation(
                    "Only a single FROM source is supported".into(),
                ));
            }
        };

        let selection = select
            .selection
            .map(|expr| self.expr_converter.convert(expr))
            .transpose()?;

        Ok(QueryStmt {
            projection,
            from,
            selection,
            order_by,
            limit,
            offset,
        })
    }

    fn convert_table_factor(&self, factor: sql_ast::TableFactor) -> Result<TableFactor> {
        match factor {
            sql_ast::TableFactor::Table { name, alias, .. } => Ok(TableFactor::Table {
                name: extract_table_name(&name)?,
                alias: alias.map(|a| a.name.value),
            }),
            sql_ast::TableFactor::Derived { subquery, alias, .. } => Ok(TableFactor::Derived {
                subquery: Box::new(self.convert_query(*subquery)?),
                alias: alias.map(|a| a.name.value),
            }),
            _ => Err(TxError::UnsupportedOperation(
                "Complex table references not supported".into(),
            )),
        }
    }

    fn convert_order_by(&self, order_by: Option<sql_ast::OrderBy>) -> Result<Vec<OrderByExpr>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };

        match order_by.kind {
            sql_ast::OrderByKind::Expressions(exprs) => exprs
                .into_iter()
                .map(|order| {
                    Ok(OrderByExpr {
                        expr: self.expr_converter.convert(order.expr)?,
                        // None = default (ASC)
                        descending: order.options.asc.map(|asc| !asc).unwrap_or(false),
                    })
                })
                .collect(),
            sql_ast::OrderByKind::All(_) => {
                Err(TxError::UnsupportedOperation("ORDER BY ALL not supported".into()))
            }
        }
    }

    fn convert_limit_clause(
        &self,
        limit_clause: Option<sql_ast::LimitClause>,
    ) -> Result<(Option<Expr>, Option<Expr>)> {
        let Some(clause) = limit_clause else {
            return Ok((None, None));
        };

        match clause {
            sql_ast::LimitClause::LimitOffset { limit, offset, .. } => {
                let limit = limit.map(|e| self.expr_converter.convert(e)).transpose()?;
                let offset = offset
                    .map(|o| self.expr_converter.convert(o.value))
                    .transpose()?;
                Ok((limit, offset))
            }
            // MySQL style: LIMIT offset, limit
            sql_ast::LimitClause::OffsetCommaLimit { offset, limit } => Ok((
                Some(self.expr_converter.convert(limit)?),
                Some(self.expr_converter.convert(offset)?),
            )),
        }
    }

    fn convert_select_item(&self, item: sql_ast::SelectItem) -> Result<SelectItem> {
        match item {
            sql_ast::SelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
                expr: self.expr_converter.convert(expr)?,
                alias: Some(alias.value),
            }),
            _ => Err(TxError::UnsupportedOperation("Unsupported select item".into())),
        }
    }
}

impl Default for SqlParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_table_name(name: &sql_ast::ObjectName) -> Result<String> {
    name.0
        .last()
        .map(|part| part.to_string())
        .ok_or_else(|| TxError::Parse("Invalid table name".into()))
}

// ============================================================================
// TESTS
// ============================================================================
