use super::paging::PageRequest;
use crate::connection::Statement;
use crate::core::{Params, Result, TxError, Value};

/// Named parameters the executor adds to paged statements
pub const LIMIT_PARAM: &str = "_limit";
pub const OFFSET_PARAM: &str = "_offset";

/// A mapped table: its name and the columns sorting may use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub table: String,
    pub columns: Vec<String>,
}

impl EntityMeta {
    pub fn new<S: AsRef<str>>(table: impl Into<String>, columns: &[S]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Component-level metadata for a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMeta {
    pub entity: Option<EntityMeta>,
}

impl RepositoryMeta {
    pub fn new() -> Self {
        Self { entity: None }
    }

    pub fn for_entity(entity: EntityMeta) -> Self {
        Self {
            entity: Some(entity),
        }
    }
}

impl Default for RepositoryMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// Statement text run as written
    Sql(String),
    /// Predicate over the bound entity's table; empty means all rows
    Expr(String),
}

/// Declarative query: where the statement comes from and the result shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub source: QuerySource,
    pub unique: bool,
    pub paged: bool,
    pub entity: Option<EntityMeta>,
}

/// Statements ready to run for one call
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub select: Statement,
    /// Present for paged queries; run before `select`
    pub count: Option<Statement>,
}

impl QueryDescriptor {
    pub fn sql(text: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Sql(text.into()))
    }

    pub fn expr(predicate: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Expr(predicate.into()))
    }

    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            unique: false,
            paged: false,
            entity: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn paged(mut self) -> Self {
        self.paged = true;
        self
    }

    pub fn with_entity(mut self, entity: EntityMeta) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn is_expr(&self) -> bool {
        matches!(self.source, QuerySource::Expr(_))
    }

    /// Check the descriptor can ever compile.
    pub fn validate(&self) -> Result<()> {
        if self.is_expr() && self.entity.is_none() {
            return Err(TxError::Configuration(
                "expression query requires a repository bound to an entity".into(),
            ));
        }
        Ok(())
    }

    /// Build the statements for one call.
    pub fn compile(&self, params: Params, page: Option<&PageRequest>) -> Result<CompiledQuery> {
        let page = match (self.paged, page) {
            (true, None) => {
                return Err(TxError::InvalidArgument(
                    "paged query requires a PageRequest".into(),
                ));
            }
            (true, Some(page)) => Some(page),
            (false, _) => None,
        };

        let base = self.base_sql(page)?;

        let Some(page) = page else {
            return Ok(CompiledQuery {
                select: Statement::with_params(base, params),
                count: None,
            });
        };

        let count = Statement::with_params(
            format!("SELECT COUNT(*) FROM ({}) AS sub", base),
            params.clone(),
        );
        let select = Statement::with_params(
            format!("{} LIMIT :{} OFFSET :{}", base, LIMIT_PARAM, OFFSET_PARAM),
            params,
        )
        .bind(LIMIT_PARAM, Value::try_from(page.size)?)
        .bind(OFFSET_PARAM, Value::try_from(page.offset()?)?);

        Ok(CompiledQuery {
            select,
            count: Some(count),
        })
    }

    fn base_sql(&self, page: Option<&PageRequest>) -> Result<String> {
        let sorts = page.map(|p| p.sorts.as_slice()).unwrap_or_default();

        match &self.source {
            QuerySource::Sql(text) => {
                if !sorts.is_empty() {
                    log::warn!("Sort order ignored for SQL query: {}", text);
                }
                Ok(text.trim().trim_end_matches(';').to_string())
            }
            QuerySource::Expr(predicate) => {
                self.validate()?;
                let entity = self.entity.as_ref().ok_or_else(|| {
                    TxError::Configuration("expression query has no entity".into())
                })?;

                let mut sql = format!("SELECT * FROM {}", entity.table);
                if !predicate.trim().is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(predicate.trim());
                }

                if !sorts.is_empty() {
                    let mut parts = Vec::with_capacity(sorts.len());
                    for sort in sorts {
                        if !entity.has_column(&sort.field) {
                            return Err(TxError::InvalidSortField(sort.field.clone()));
                        }
                        parts.push(sort.to_string());
                    }
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&parts.join(", "));
                }

                Ok(sql)
            }
        }
    }
}
