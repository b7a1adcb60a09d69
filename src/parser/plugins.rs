// ============================================================================
// Expression plugins: sqlparser expressions -> our Expr
// ============================================================================

use super::ast::{BinaryOp, Expr};
use crate::core::{Result, TxError, Value};
use sqlparser::ast as sql_ast;

/// Converts one family of sqlparser expressions into our AST
pub trait ExpressionPlugin: Send + Sync {
    /// Name for trace logs
    fn name(&self) -> &'static str;

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool;

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr>;
}

pub struct ExpressionPluginRegistry {
    plugins: Vec<Box<dyn ExpressionPlugin>>,
}

impl ExpressionPluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn ExpressionPlugin>) {
        log::trace!("Registered expression plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    pub fn with_default_plugins() -> Self {
        let mut registry = Self::new();

        // Nested first so parentheses unwrap before anything else
        registry.register(Box::new(NestedPlugin));
        registry.register(Box::new(FunctionPlugin));
        registry.register(Box::new(LikePlugin));
        registry.register(Box::new(BetweenPlugin));
        registry.register(Box::new(IsNullPlugin));
        registry.register(Box::new(InListPlugin));
        registry.register(Box::new(BinaryOpPlugin));
        registry.register(Box::new(UnaryOpPlugin));

        registry
    }

    pub fn find_plugin(&self, expr: &sql_ast::Expr) -> Option<&dyn ExpressionPlugin> {
        self.plugins
            .iter()
            .find(|plugin| plugin.can_handle(expr))
            .map(|boxed| &**boxed)
    }
}

impl Default for ExpressionPluginRegistry {
    fn default() -> Self {
        Self::with_default_plugins()
    }
}

pub struct ExpressionConverter {
    registry: ExpressionPluginRegistry,
}

impl ExpressionConverter {
    pub fn new() -> Self {
        Self {
            registry: ExpressionPluginRegistry::with_default_plugins(),
        }
    }

    pub fn with_custom_plugins(registry: ExpressionPluginRegistry) -> Self {
        Self { registry }
    }

    pub fn convert(&self, expr: sql_ast::Expr) -> Result<Expr> {
        // Leaves are handled directly
        match &expr {
            sql_ast::Expr::Identifier(ident) => {
                return Ok(Expr::Column(ident.value.clone()));
            }
            sql_ast::Expr::CompoundIdentifier(idents) => {
                let parts = idents.iter().map(|i| i.value.clone()).collect();
                return Ok(Expr::CompoundIdentifier(parts));
            }
            sql_ast::Expr::Value(val) => {
                return match &val.value {
                    sql_ast::Value::Placeholder(name) => Ok(Expr::Parameter(
                        name.trim_start_matches([':', '$', '@']).to_string(),
                    )),
                    other => Ok(Expr::Literal(self.convert_value(other)?)),
                };
            }
            _ => {}
        }

        if let Some(plugin) = self.registry.find_plugin(&expr) {
            log::trace!("Converting expression with plugin {}", plugin.name());
            return plugin.convert(expr, self);
        }

        Err(TxError::UnsupportedOperation(format!(
            "Unsupported expression: {}",
            expr
        )))
    }

    pub fn convert_boxed(&self, expr: Box<sql_ast::Expr>) -> Result<Box<Expr>> {
        self.convert(*expr).map(Box::new)
    }

    pub fn convert_value(&self, val: &sql_ast::Value) -> Result<Value> {
        match val {
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(TxError::TypeMismatch(format!("Invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Value::Text(s.clone()))
            }
            sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
            sql_ast::Value::Null => Ok(Value::Null),
            _ => Err(TxError::UnsupportedOperation(format!(
                "Unsupported value: {}",
                val
            ))),
        }
    }
}

impl Default for ExpressionConverter {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected(plugin: &str, expr: &sql_ast::Expr) -> TxError {
    TxError::Parse(format!("{} plugin cannot convert '{}'", plugin, expr))
}

// ============================================================================
// Built-in plugins
// ============================================================================

pub struct NestedPlugin;

impl ExpressionPlugin for NestedPlugin {
    fn name(&self) -> &'static str {
        "NESTED"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Nested(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Nested(inner) => converter.convert(*inner),
            other => Err(unexpected(self.name(), &other)),
        }
    }
}

pub struct FunctionPlugin;

impl ExpressionPlugin for FunctionPlugin {
    fn name(&self) -> &'static str {
        "FUNCTION"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Function(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let sql_ast::Expr::Function(func) = expr else {
            return Err(unexpected(self.name(), &expr));
        };

        let name = func.name.to_string().to_uppercase();
        let args = match func.args {
            sql_ast::FunctionArguments::List(arg_list) => arg_list
                .args
                .into_iter()
                .map(|arg| match arg {
                    sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e)) => {
                        converter.convert(e)
                    }
                    sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard) => {
                        Ok(Expr::Star)
                    }
                    other => Err(TxError::UnsupportedOperation(format!(
                        "Unsupported function argument: {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Expr::Function { name, args })
    }
}

pub struct LikePlugin;

impl ExpressionPlugin for LikePlugin {
    fn name(&self) -> &'static str {
        "LIKE"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Like { .. } | sql_ast::Expr::ILike { .. })
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let (negated, inner, pattern, escape_char, case_insensitive) = match expr {
            sql_ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => (negated, expr, pattern, escape_char, false),
            sql_ast::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => (negated, expr, pattern, escape_char, true),
            other => return Err(unexpected(self.name(), &other)),
        };

        if escape_char.is_some() {
            return Err(TxError::UnsupportedOperation("LIKE ESCAPE not supported".into()));
        }

        Ok(Expr::Like {
            expr: converter.convert_boxed(inner)?,
            pattern: converter.convert_boxed(pattern)?,
            negated,
            case_insensitive,
        })
    }
}

pub struct BetweenPlugin;

impl ExpressionPlugin for BetweenPlugin {
    fn name(&self) -> &'static str {
        "BETWEEN"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::Between { .. })
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(Expr::Between {
                expr: converter.convert_boxed(expr)?,
                low: converter.convert_boxed(low)?,
                high: converter.convert_boxed(high)?,
                negated,
            }),
            other => Err(unexpected(self.name(), &other)),
        }
    }
}

pub struct IsNullPlugin;

impl ExpressionPlugin for IsNullPlugin {
    fn name(&self) -> &'static str {
        "IS_NULL"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::IsNull(_) | sql_ast::Expr::IsNotNull(_))
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::IsNull(inner) => Ok(Expr::IsNull {
                expr: converter.convert_boxed(inner)?,
                negated: false,
            }),
            sql_ast::Expr::IsNotNull(inner) => Ok(Expr::IsNull {
                expr: converter.convert_boxed(inner)?,
                negated: true,
            }),
            other => Err(unexpected(self.name(), &other)),
        }
    }
}

pub struct InListPlugin;

impl ExpressionPlugin for InListPlugin {
    fn name(&self) -> &'static str {
        "IN_LIST"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::InList { .. })
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        match expr {
            sql_ast::Expr::InList {
                expr,
                list,
                negated,
            } => Ok(Expr::In {
                expr: converter.convert_boxed(expr)?,
                list: list
                    .into_iter()
                    .map(|item| converter.convert(item))
                    .collect::<Result<Vec<_>>>()?,
                negated,
            }),
            other => Err(unexpected(self.name(), &other)),
        }
    }
}

/// Arithmetic, comparison and logical operators
pub struct BinaryOpPlugin;

impl BinaryOpPlugin {
    fn map_operator(op: &sql_ast::BinaryOperator) -> Option<BinaryOp> {
        use sql_ast::BinaryOperator as Op;
        Some(match op {
            Op::Plus => BinaryOp::Add,
            Op::Minus => BinaryOp::Subtract,
            Op::Multiply => BinaryOp::Multiply,
            Op::Divide => BinaryOp::Divide,
            Op::Modulo => BinaryOp::Modulo,
            Op::Eq => BinaryOp::Eq,
            Op::NotEq => BinaryOp::NotEq,
            Op::Lt => BinaryOp::Lt,
            Op::LtEq => BinaryOp::LtEq,
            Op::Gt => BinaryOp::Gt,
            Op::GtEq => BinaryOp::GtEq,
            Op::And => BinaryOp::And,
            Op::Or => BinaryOp::Or,
            Op::StringConcat => BinaryOp::Concat,
            _ => return None,
        })
    }
}

impl ExpressionPlugin for BinaryOpPlugin {
    fn name(&self) -> &'static str {
        "BINARY_OP"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(expr, sql_ast::Expr::BinaryOp { op, .. } if Self::map_operator(op).is_some())
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let sql_ast::Expr::BinaryOp { left, op, right } = expr else {
            return Err(unexpected(self.name(), &expr));
        };
        let op = Self::map_operator(&op)
            .ok_or_else(|| TxError::UnsupportedOperation(format!("Unsupported operator: {}", op)))?;

        Ok(Expr::BinaryOp {
            left: converter.convert_boxed(left)?,
            op,
            right: converter.convert_boxed(right)?,
        })
    }
}

pub struct UnaryOpPlugin;

impl ExpressionPlugin for UnaryOpPlugin {
    fn name(&self) -> &'static str {
        "UNARY_OP"
    }

    fn can_handle(&self, expr: &sql_ast::Expr) -> bool {
        matches!(
            expr,
            sql_ast::Expr::UnaryOp {
                op: sql_ast::UnaryOperator::Not
                    | sql_ast::UnaryOperator::Minus
                    | sql_ast::UnaryOperator::Plus,
                ..
            }
        )
    }

    fn convert(&self, expr: sql_ast::Expr, converter: &ExpressionConverter) -> Result<Expr> {
        let sql_ast::Expr::UnaryOp { op, expr: inner } = expr else {
            return Err(unexpected(self.name(), &expr));
        };
        let inner = converter.convert_boxed(inner)?;

        match op {
            sql_ast::UnaryOperator::Not => Ok(Expr::Not(inner)),
            sql_ast::UnaryOperator::Minus => Ok(Expr::Negate(inner)),
            sql_ast::UnaryOperator::Plus => Ok(*inner),
            other => Err(TxError::UnsupportedOperation(format!(
                "Unsupported unary operator: {}",
                other
            ))),
        }
    }
}
