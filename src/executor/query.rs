// ============================================================================
// src/executor/query.rs - SELECT
// ============================================================================
//
// Evaluation order: source, WHERE, aggregation, ORDER BY, OFFSET/LIMIT,
// projection. ORDER BY sees the source columns plus projection aliases.
//
// ============================================================================

use super::executor::mismatched;
use super::sort::{SortDirection, sort_by_keys};
use super::{ExecutionContext, Executor};
use crate::core::{Params, Result, Row, TxError, Value};
use crate::expression::eval::apply_binary;
use crate::expression::{Evaluator, RowScope};
use crate::parser::ast::{Expr, QueryStmt, SelectItem, Statement, TableFactor, is_aggregate};
use crate::result::QueryResult;
use crate::storage::Catalog;

use async_trait::async_trait;
use std::cmp::Ordering;

pub struct SelectExecutor;

#[async_trait]
impl Executor for SelectExecutor {
    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn can_handle(&self, stmt: &Statement) -> bool {
        matches!(stmt, Statement::Query(_))
    }

    async fn execute(&self, stmt: &Statement, ctx: &mut ExecutionContext<'_>) -> Result<QueryResult> {
        let Statement::Query(query) = stmt else {
            return Err(mismatched(self.name()));
        };
        run_query(query, ctx.catalog, ctx.params)
    }
}

/// Rows produced by a FROM clause
struct Source {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

pub fn run_query(query: &QueryStmt, catalog: &Catalog, params: &Params) -> Result<QueryResult> {
    let evaluator = Evaluator::new(params);
    let source = load_source(query.from.as_ref(), catalog, params)?;

    let rows = match &query.selection {
        Some(predicate) => {
            let mut kept = Vec::with_capacity(source.rows.len());
            for row in source.rows {
                let scope = RowScope::new(&source.name, &source.columns, &row);
                if evaluator.matches(predicate, &scope)? {
                    kept.push(row);
                }
            }
            kept
        }
        None => source.rows,
    };
    let source = Source { rows, ..source };

    let is_aggregate_query = query.projection.iter().any(|item| match item {
        SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
        SelectItem::Wildcard => false,
    });

    let result = if is_aggregate_query {
        aggregate(query, &source, &evaluator)?
    } else {
        let ordered = order_rows(query, source, &evaluator)?;
        project(query, &ordered, &evaluator)?
    };

    apply_window(query, result, &evaluator)
}

fn load_source(from: Option<&TableFactor>, catalog: &Catalog, params: &Params) -> Result<Source> {
    match from {
        None => Ok(Source {
            name: String::new(),
            columns: Vec::new(),
            rows: vec![Vec::new()],
        }),
        Some(TableFactor::Table { name, alias }) => {
            let table = catalog.table(name)?;
            Ok(Source {
                name: alias.clone().unwrap_or_else(|| name.clone()),
                columns: table.schema().column_names(),
                rows: table.scan().map(|(_, row)| row.clone()).collect(),
            })
        }
        Some(TableFactor::Derived { subquery, alias }) => {
            let inner = run_query(subquery, catalog, params)?;
            Ok(Source {
                name: alias.clone().unwrap_or_else(|| "subquery".into()),
                columns: inner.columns,
                rows: inner.rows,
            })
        }
    }
}

fn order_rows(query: &QueryStmt, source: Source, evaluator: &Evaluator<'_>) -> Result<Source> {
    if query.order_by.is_empty() {
        return Ok(source);
    }

    let directions: Vec<SortDirection> = query
        .order_by
        .iter()
        .map(|order| SortDirection::new(order.descending))
        .collect();

    let Source { name, columns, rows } = source;
    let keyed = rows
        .into_iter()
        .map(|row| {
            let scope = RowScope::new(&name, &columns, &row);
            let keys = query
                .order_by
                .iter()
                .map(|order| {
                    let expr = resolve_alias(&order.expr, query, &columns);
                    evaluator.eval(expr, &scope)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((keys, row))
        })
        .collect::<Result<Vec<_>>>()?;

    let rows = sort_by_keys(keyed, &directions)?;
    Ok(Source { name, columns, rows })
}

/// An ORDER BY name that is a projection alias, not a source column, sorts
/// by the aliased expression.
fn resolve_alias<'q>(expr: &'q Expr, query: &'q QueryStmt, columns: &[String]) -> &'q Expr {
    let Expr::Column(name) = expr else {
        return expr;
    };
    if columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        return expr;
    }

    query
        .projection
        .iter()
        .find_map(|item| match item {
            SelectItem::Expr {
                expr,
                alias: Some(alias),
            } if alias.eq_ignore_ascii_case(name) => Some(expr),
            _ => None,
        })
        .unwrap_or(expr)
}

fn output_name(expr: &Expr, alias: Option<&String>) -> String {
    if let Some(alias) = alias {
        return alias.clone();
    }
    match expr {
        Expr::Column(name) => name.clone(),
        Expr::CompoundIdentifier(parts) => parts.last().cloned().unwrap_or_default(),
        other => other.to_string().to_lowercase(),
    }
}

fn project(query: &QueryStmt, source: &Source, evaluator: &Evaluator<'_>) -> Result<QueryResult> {
    let mut columns = Vec::new();
    for item in &query.projection {
        match item {
            SelectItem::Wildcard => columns.extend(source.columns.iter().cloned()),
            SelectItem::Expr { expr, alias } => columns.push(output_name(expr, alias.as_ref())),
        }
    }

    let rows = source
        .rows
        .iter()
        .map(|row| {
            let scope = RowScope::new(&source.name, &source.columns, row);
            let mut projected = Vec::with_capacity(columns.len());
            for item in &query.projection {
                match item {
                    SelectItem::Wildcard => projected.extend(row.iter().cloned()),
                    SelectItem::Expr { expr, .. } => projected.push(evaluator.eval(expr, &scope)?),
                }
            }
            Ok(projected)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(QueryResult::new(columns, rows))
}

// ============================================================================
// Aggregates (no GROUP BY: the whole input is one group)
// ============================================================================

fn aggregate(query: &QueryStmt, source: &Source, evaluator: &Evaluator<'_>) -> Result<QueryResult> {
    let mut columns = Vec::new();
    let mut row = Vec::new();

    for item in &query.projection {
        let SelectItem::Expr { expr, alias } = item else {
            return Err(TxError::Execution(
                "'*' cannot be mixed with aggregates".into(),
            ));
        };
        columns.push(output_name(expr, alias.as_ref()));
        row.push(eval_aggregate(expr, source, evaluator)?);
    }

    Ok(QueryResult::new(columns, vec![row]))
}

fn eval_aggregate(expr: &Expr, source: &Source, evaluator: &Evaluator<'_>) -> Result<Value> {
    match expr {
        Expr::Function { name, args } if is_aggregate(name) => {
            let name = name.to_ascii_uppercase();
            if name == "COUNT" && matches!(args.as_slice(), [Expr::Star]) {
                return Ok(Value::Integer(source.rows.len() as i64));
            }
            let [arg] = args.as_slice() else {
                return Err(TxError::Execution(format!(
                    "{} takes exactly one argument",
                    name
                )));
            };

            let mut values = Vec::with_capacity(source.rows.len());
            for row in &source.rows {
                let scope = RowScope::new(&source.name, &source.columns, row);
                let value = evaluator.eval(arg, &scope)?;
                if !value.is_null() {
                    values.push(value);
                }
            }
            fold_aggregate(&name, values)
        }
        Expr::BinaryOp { left, op, right } => apply_binary(
            *op,
            eval_aggregate(left, source, evaluator)?,
            eval_aggregate(right, source, evaluator)?,
        ),
        Expr::Literal(_) | Expr::Parameter(_) => evaluator.eval(expr, &RowScope::empty()),
        other => Err(TxError::Execution(format!(
            "'{}' must appear inside an aggregate function",
            other
        ))),
    }
}

/// Fold non-null values. Empty input gives NULL, except COUNT which gives 0.
fn fold_aggregate(name: &str, values: Vec<Value>) -> Result<Value> {
    if name == "COUNT" {
        return Ok(Value::Integer(values.len() as i64));
    }
    if values.is_empty() {
        return Ok(Value::Null);
    }

    match name {
        "MIN" | "MAX" => {
            let wanted = if name == "MIN" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best = Value::Null;
            for value in values {
                if best.is_null() || value.compare(&best)? == wanted {
                    best = value;
                }
            }
            Ok(best)
        }
        "SUM" => {
            let mut total = Value::Integer(0);
            for value in values {
                total = apply_binary(crate::parser::ast::BinaryOp::Add, total, value)?;
            }
            Ok(total)
        }
        "AVG" => {
            let count = values.len() as f64;
            let mut sum = 0.0;
            for value in &values {
                sum += value.as_f64().ok_or_else(|| {
                    TxError::TypeMismatch(format!("AVG over {}", value.type_name()))
                })?;
            }
            Ok(Value::Float(sum / count))
        }
        other => Err(TxError::UnsupportedOperation(format!(
            "Unknown aggregate: {}",
            other
        ))),
    }
}

// ============================================================================
// OFFSET / LIMIT
// ============================================================================

fn apply_window(query: &QueryStmt, result: QueryResult, evaluator: &Evaluator<'_>) -> Result<QueryResult> {
    let offset = window_bound(query.offset.as_ref(), "OFFSET", evaluator)?.unwrap_or(0);
    let limit = window_bound(query.limit.as_ref(), "LIMIT", evaluator)?;

    if offset == 0 && limit.is_none() {
        return Ok(result);
    }

    let rows = result
        .rows
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Ok(QueryResult::new(result.columns, rows))
}

fn window_bound(expr: Option<&Expr>, clause: &str, evaluator: &Evaluator<'_>) -> Result<Option<usize>> {
    let Some(expr) = expr else {
        return Ok(None);
    };

    match evaluator.eval(expr, &RowScope::empty())? {
        Value::Null => Ok(None),
        Value::Integer(n) if n >= 0 => Ok(Some(n as usize)),
        other => Err(TxError::InvalidArgument(format!(
            "{} must be a non-negative integer, got {}",
            clause, other
        ))),
    }
}
