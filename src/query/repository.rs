use super::executor::{QueryExecutor, QueryOutcome};
use super::mapping::FromRecord;
use super::paging::{Page, PageRequest};
use crate::core::{Failure, Params, Result, TxError};
use crate::transaction::{MethodKey, TransactionalInterceptor, TxContext, TxScope};
use std::future::Future;

/// A repository component: declarative queries plus hand-written methods,
/// each intercepted under the component's metadata.
#[derive(Debug, Clone)]
pub struct Repository {
    name: String,
    interceptor: TransactionalInterceptor,
}

impl Repository {
    pub fn new(name: impl Into<String>, interceptor: TransactionalInterceptor) -> Self {
        Self {
            name: name.into(),
            interceptor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, method: &str) -> MethodKey {
        MethodKey::new(self.name.as_str(), method)
    }

    /// Run a declarative list query.
    pub async fn find<T: FromRecord>(&self, ctx: &TxContext, method: &str, params: Params) -> Result<Vec<T>> {
        match self.run(ctx, method, params, None, Shape::Rows).await? {
            QueryOutcome::Rows(rows) => rows.into_iter().map(T::from_record).collect(),
            _ => Err(self.wrong_shape(method, Shape::Rows)),
        }
    }

    /// Run a declarative `unique` query. Zero rows is `Ok(None)`.
    pub async fn find_unique<T: FromRecord>(
        &self,
        ctx: &TxContext,
        method: &str,
        params: Params,
    ) -> Result<Option<T>> {
        match self.run(ctx, method, params, None, Shape::Unique).await? {
            QueryOutcome::Unique(row) => row.map(T::from_record).transpose(),
            _ => Err(self.wrong_shape(method, Shape::Unique)),
        }
    }

    pub async fn find_page<T: FromRecord>(
        &self,
        ctx: &TxContext,
        method: &str,
        params: Params,
        page: PageRequest,
    ) -> Result<Page<T>> {
        match self.run(ctx, method, params, Some(page), Shape::Page).await? {
            QueryOutcome::Page(page) => page.try_map(T::from_record),
            _ => Err(self.wrong_shape(method, Shape::Page)),
        }
    }

    /// Run a hand-written repository method.
    pub async fn call<'c, T, E, F, Fut>(&self, ctx: &'c TxContext, method: &str, body: F) -> std::result::Result<T, E>
    where
        E: Failure,
        F: FnOnce(TxScope<'c>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.interceptor.invoke(ctx, &self.key(method), body).await
    }

    async fn run(
        &self,
        ctx: &TxContext,
        method: &str,
        params: Params,
        page: Option<PageRequest>,
        expected: Shape,
    ) -> Result<QueryOutcome> {
        let key = self.key(method);
        let descriptor = self
            .interceptor
            .registry()
            .query_descriptor(&key)
            .ok_or_else(|| TxError::Configuration(format!("no query registered for {}", key)))?;

        let declared = match (descriptor.paged, descriptor.unique) {
            (true, _) => Shape::Page,
            (false, true) => Shape::Unique,
            (false, false) => Shape::Rows,
        };
        if declared != expected {
            return Err(self.wrong_shape(method, declared));
        }

        self.interceptor
            .invoke(ctx, &key, |scope| async move {
                let session = scope.session()?;
                QueryExecutor::execute(session, &descriptor, params, page.as_ref()).await
            })
            .await
    }

    fn wrong_shape(&self, method: &str, declared: Shape) -> TxError {
        TxError::InvalidArgument(format!(
            "{} is declared as a {:?} query",
            self.key(method),
            declared
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Rows,
    Unique,
    Page,
}
