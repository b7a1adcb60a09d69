// ============================================================================
// Declarative Query Executor
// ============================================================================
//
// Compiles a descriptor, runs it on the caller's session and shapes the rows:
//
//   paged   -> COUNT over the wrapped statement, then the LIMIT/OFFSET page
//   unique  -> first row or None
//   default -> every row, in result order
//
// Both statements of a paged query run on the same session, so they share
// one transaction boundary.
//
// ============================================================================

use super::descriptor::QueryDescriptor;
use super::paging::{Page, PageRequest};
use crate::connection::Session;
use crate::core::{Params, Record, Result, TxError, Value};

/// Shaped result of one declarative query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Record>),
    Unique(Option<Record>),
    Page(Page<Record>),
}

impl QueryOutcome {
    pub fn shape(&self) -> &'static str {
        match self {
            QueryOutcome::Rows(_) => "rows",
            QueryOutcome::Unique(_) => "unique",
            QueryOutcome::Page(_) => "page",
        }
    }
}

pub struct QueryExecutor;

impl QueryExecutor {
    pub async fn execute(
        session: &Session,
        descriptor: &QueryDescriptor,
        params: Params,
        page: Option<&PageRequest>,
    ) -> Result<QueryOutcome> {
        let compiled = descriptor.compile(params, page)?;

        if let (Some(count), Some(page)) = (compiled.count.as_ref(), page) {
            let total = session.execute(count).await?;
            let total = count_value(total.scalar_one()?)?;

            let rows = session.execute(&compiled.select).await?;
            log::debug!(
                "Paged query on {}: page={} size={} total={}",
                session.id(),
                page.page,
                page.size,
                total
            );

            return Ok(QueryOutcome::Page(Page::new(
                rows.into_records(),
                total,
                page.page,
                page.size,
            )));
        }

        let rows = session.execute(&compiled.select).await?;
        if descriptor.unique {
            return Ok(QueryOutcome::Unique(rows.into_records().into_iter().next()));
        }

        Ok(QueryOutcome::Rows(rows.into_records()))
    }
}

fn count_value(value: &Value) -> Result<usize> {
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| TxError::Mapping(format!("count query returned {}", value)))
}
