use crate::core::{DataType, Value};
use std::fmt;

/// Root statement type
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    DropTable(DropTableStmt),
    Insert(InsertStmt),
    Query(QueryStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

impl Statement {
    /// Statements that change data or schema
    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::Query(_))
    }
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// DROP TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    pub table_name: String,
    pub if_exists: bool,
}

/// INSERT ... VALUES statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table_name: String,
    /// None = all columns in schema order
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expr>>,
}

/// SELECT query statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStmt {
    pub projection: Vec<SelectItem>,
    /// None for `SELECT <expr>` without FROM
    pub from: Option<TableFactor>,
    pub selection: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableFactor {
    Table { name: String, alias: Option<String> },
    Derived { subquery: Box<QueryStmt>, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub descending: bool,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table_name: String,
    pub assignments: Vec<Assignment>,
    pub selection: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table_name: String,
    pub selection: Option<Expr>,
}

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(String),

    /// Compound identifier (e.g. table.column)
    CompoundIdentifier(Vec<String>),

    Literal(Value),

    /// Named parameter placeholder, stored without the leading colon
    Parameter(String),

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    Not(Box<Expr>),

    Negate(Box<Expr>),

    /// LIKE / ILIKE pattern matching
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        case_insensitive: bool,
    },

    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },

    /// Scalar or aggregate function call; `COUNT(*)` has a `Star` argument
    Function { name: String, args: Vec<Expr> },

    Star,
}

impl Expr {
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args } => {
                is_aggregate(name) || args.iter().any(Expr::contains_aggregate)
            }
            Expr::BinaryOp { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Not(inner) | Expr::Negate(inner) => inner.contains_aggregate(),
            _ => false,
        }
    }
}

pub fn is_aggregate(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "COUNT" | "SUM" | "MIN" | "MAX" | "AVG"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logical
    And,
    Or,

    Concat,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = |negated: &bool| if *negated { "NOT " } else { "" };
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::CompoundIdentifier(parts) => write!(f, "{}", parts.join(".")),
            Expr::Literal(val) => write!(f, "{}", val),
            Expr::Parameter(name) => write!(f, ":{}", name),
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Not(expr) => write!(f, "NOT {}", expr),
            Expr::Negate(expr) => write!(f, "-{}", expr),
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let keyword = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{} {}{} {}", expr, not(negated), keyword, pattern)
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => write!(f, "{} {}BETWEEN {} AND {}", expr, not(negated), low, high),
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "{} {}IN ({})", expr, not(negated), items.join(", "))
            }
            Expr::IsNull { expr, negated } => write!(f, "{} IS {}NULL", expr, not(negated)),
            Expr::Function { name, args } => {
                let items: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", name, items.join(", "))
            }
            Expr::Star => write!(f, "*"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "||",
        };
        write!(f, "{}", symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_named_parameters() {
        let expr = Expr::BinaryOp {
            left: Box::new(Expr::Column("age".into())),
            op: BinaryOp::GtEq,
            right: Box::new(Expr::Parameter("min".into())),
        };
        assert_eq!(expr.to_string(), "(age >= :min)");
    }

    #[test]
    fn test_contains_aggregate() {
        let count = Expr::Function {
            name: "count".into(),
            args: vec![Expr::Star],
        };
        assert!(count.contains_aggregate());
        assert_eq!(count.to_string(), "count(*)");

        let upper = Expr::Function {
            name: "UPPER".into(),
            args: vec![Expr::Column("name".into())],
        };
        assert!(!upper.contains_aggregate());
    }
}
