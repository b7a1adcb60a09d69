// ============================================================================
// Expression evaluation over one row
// ============================================================================
//
// Three-valued logic: comparisons and arithmetic with a NULL operand yield
// NULL, AND/OR follow SQL truth tables, and a filter keeps a row only when
// its predicate is TRUE.
//
// ============================================================================

use super::pattern::eval_like;
use crate::core::{Params, Result, TxError, Value};
use crate::parser::ast::{BinaryOp, Expr, is_aggregate};
use std::cmp::Ordering;

/// Column names and values of the row an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RowScope<'a> {
    source: &'a str,
    columns: &'a [String],
    row: &'a [Value],
}

impl<'a> RowScope<'a> {
    pub fn new(source: &'a str, columns: &'a [String], row: &'a [Value]) -> Self {
        Self {
            source,
            columns,
            row,
        }
    }

    /// A scope with no columns, for VALUES lists, LIMIT and OFFSET
    pub fn empty() -> RowScope<'static> {
        RowScope {
            source: "",
            columns: &[],
            row: &[],
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.row.get(idx))
            .ok_or_else(|| TxError::ColumnNotFound(name.to_string(), self.source.to_string()))
    }
}

pub struct Evaluator<'p> {
    params: &'p Params,
}

impl<'p> Evaluator<'p> {
    pub fn new(params: &'p Params) -> Self {
        Self { params }
    }

    pub fn eval(&self, expr: &Expr, scope: &RowScope<'_>) -> Result<Value> {
        match expr {
            Expr::Column(name) => scope.lookup(name).cloned(),
            Expr::CompoundIdentifier(parts) => match parts.last() {
                Some(name) => scope.lookup(name).cloned(),
                None => Err(TxError::Parse("Empty identifier".into())),
            },
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Parameter(name) => self.parameter(name),
            Expr::BinaryOp { left, op, right } => self.eval_binary(left, *op, right, scope),
            Expr::Not(inner) => Ok(match self.eval(inner, scope)? {
                Value::Null => Value::Null,
                value => Value::Boolean(!value.as_bool()),
            }),
            Expr::Negate(inner) => negate(self.eval(inner, scope)?),
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let text = self.eval(expr, scope)?;
                let pattern = self.eval(pattern, scope)?;
                match (&text, &pattern) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Text(t), Value::Text(p)) => {
                        Ok(Value::Boolean(eval_like(t, p, !case_insensitive)? != *negated))
                    }
                    _ => Err(TxError::TypeMismatch(format!(
                        "LIKE requires TEXT operands, got {} and {}",
                        text.type_name(),
                        pattern.type_name()
                    ))),
                }
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = self.eval(expr, scope)?;
                let low = self.eval(low, scope)?;
                let high = self.eval(high, scope)?;
                if value.is_null() || low.is_null() || high.is_null() {
                    return Ok(Value::Null);
                }
                let inside = value.compare(&low)? != Ordering::Less
                    && value.compare(&high)? != Ordering::Greater;
                Ok(Value::Boolean(inside != *negated))
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let value = self.eval(expr, scope)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item, scope)?;
                    if candidate.is_null() {
                        saw_null = true;
                    } else if value.compare(&candidate)? == Ordering::Equal {
                        return Ok(Value::Boolean(!negated));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Boolean(*negated))
                }
            }
            Expr::IsNull { expr, negated } => {
                Ok(Value::Boolean(self.eval(expr, scope)?.is_null() != *negated))
            }
            Expr::Function { name, args } => self.eval_function(name, args, scope),
            Expr::Star => Err(TxError::Execution("'*' is only valid in COUNT(*)".into())),
        }
    }

    /// Evaluate a predicate. NULL counts as false.
    pub fn matches(&self, predicate: &Expr, scope: &RowScope<'_>) -> Result<bool> {
        Ok(self.eval(predicate, scope)?.as_bool())
    }

    fn parameter(&self, name: &str) -> Result<Value> {
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| TxError::InvalidArgument(format!("Parameter ':{}' is not bound", name)))
    }

    fn eval_binary(&self, left: &Expr, op: BinaryOp, right: &Expr, scope: &RowScope<'_>) -> Result<Value> {
        let left = self.eval(left, scope)?;
        let right = self.eval(right, scope)?;
        apply_binary(op, left, right)
    }

    fn eval_function(&self, name: &str, args: &[Expr], scope: &RowScope<'_>) -> Result<Value> {
        if is_aggregate(name) {
            return Err(TxError::Execution(format!(
                "Aggregate {} is not allowed here",
                name
            )));
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg, scope))
            .collect::<Result<Vec<_>>>()?;

        let upper = name.to_ascii_uppercase();
        if !matches!(upper.as_str(), "COALESCE" | "UPPER" | "LOWER" | "LENGTH" | "ABS") {
            return Err(TxError::UnsupportedOperation(format!(
                "Unknown function: {}",
                name
            )));
        }

        match (upper.as_str(), values.as_slice()) {
            ("COALESCE", values) => Ok(values
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null)),
            (_, [Value::Null]) => Ok(Value::Null),
            ("UPPER", [Value::Text(s)]) => Ok(Value::Text(s.to_uppercase())),
            ("LOWER", [Value::Text(s)]) => Ok(Value::Text(s.to_lowercase())),
            ("LENGTH", [Value::Text(s)]) => Ok(Value::Integer(s.chars().count() as i64)),
            ("ABS", [Value::Integer(i)]) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| TxError::Execution("Integer overflow in ABS".into())),
            ("ABS", [Value::Float(f)]) => Ok(Value::Float(f.abs())),
            (function, _) => Err(TxError::TypeMismatch(format!(
                "Invalid arguments for {}",
                function
            ))),
        }
    }
}

/// Apply a binary operator to two evaluated operands.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::And => Ok(match (truth(&left), truth(&right)) {
            (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
            (Some(true), Some(true)) => Value::Boolean(true),
            _ => Value::Null,
        }),
        BinaryOp::Or => Ok(match (truth(&left), truth(&right)) {
            (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
            (Some(false), Some(false)) => Value::Boolean(false),
            _ => Value::Null,
        }),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        BinaryOp::Eq => Ok(Value::Boolean(left.compare(&right)? == Ordering::Equal)),
        BinaryOp::NotEq => Ok(Value::Boolean(left.compare(&right)? != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Boolean(left.compare(&right)? == Ordering::Less)),
        BinaryOp::LtEq => Ok(Value::Boolean(left.compare(&right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Boolean(left.compare(&right)? == Ordering::Greater)),
        BinaryOp::GtEq => Ok(Value::Boolean(left.compare(&right)? != Ordering::Less)),
        BinaryOp::Concat => Ok(Value::Text(format!("{}{}", plain(&left), plain(&right)))),
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, &left, &right)
        }
    }
}

fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        other => Some(other.as_bool()),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

fn negate(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => i
            .checked_neg()
            .map(Value::Integer)
            .ok_or_else(|| TxError::Execution("Integer overflow".into())),
        Value::Float(f) => Ok(Value::Float(-f)),
        other => Err(TxError::TypeMismatch(format!(
            "Cannot negate {}",
            other.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let overflow = || TxError::Execution(format!("Integer overflow in {}", op));
    let division_by_zero = || TxError::Execution("Division by zero".into());

    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
            BinaryOp::Subtract => a.checked_sub(b).ok_or_else(overflow)?,
            BinaryOp::Multiply => a.checked_mul(b).ok_or_else(overflow)?,
            BinaryOp::Divide if b == 0 => return Err(division_by_zero()),
            BinaryOp::Divide => a.checked_div(b).ok_or_else(overflow)?,
            BinaryOp::Modulo if b == 0 => return Err(division_by_zero()),
            BinaryOp::Modulo => a.checked_rem(b).ok_or_else(overflow)?,
            _ => return Err(TxError::Execution(format!("{} is not arithmetic", op))),
        };
        return Ok(Value::Integer(result));
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(TxError::TypeMismatch(format!(
            "Cannot apply {} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        )));
    };

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide if b == 0.0 => return Err(division_by_zero()),
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo if b == 0.0 => return Err(division_by_zero()),
        BinaryOp::Modulo => a % b,
        _ => return Err(TxError::Execution(format!("{} is not arithmetic", op))),
    };
    Ok(Value::Float(result))
}
