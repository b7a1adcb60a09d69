use super::context::{TxContext, TxScope};
use super::manager::SessionManager;
use super::spec::MethodTxSpec;
use crate::core::{Failure, Result, TxError};
use crate::query::{QueryDescriptor, RepositoryMeta};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

/// Identity of an interceptable callable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
    pub component: String,
    pub method: String,
}

impl MethodKey {
    pub fn new(component: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.method)
    }
}

/// Explicit method metadata, registered at startup.
///
/// Resolution order for a key: an explicit `transactional` spec, then the
/// read-only default of a declarative query, then the read-write default of
/// its repository component. Resolved specs are cached.
#[derive(Default)]
pub struct MethodRegistry {
    explicit: HashMap<MethodKey, MethodTxSpec>,
    repositories: HashMap<String, RepositoryMeta>,
    queries: HashMap<MethodKey, Arc<QueryDescriptor>>,
    resolved: Mutex<HashMap<MethodKey, Arc<MethodTxSpec>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transactional(&mut self, key: MethodKey, spec: MethodTxSpec) -> &mut Self {
        self.invalidate(&key);
        self.explicit.insert(key, spec);
        self
    }

    /// Register a repository component. Its expression queries are bound to
    /// the entity here.
    pub fn repository(&mut self, component: impl Into<String>, meta: RepositoryMeta) -> Result<&mut Self> {
        let component = component.into();

        let mut rebound = Vec::new();
        for (key, descriptor) in self.queries.iter().filter(|(k, _)| k.component == component) {
            let bound = bind_entity(descriptor, &meta).map_err(|e| qualify(key, e))?;
            rebound.push((key.clone(), Arc::new(bound)));
        }
        self.queries.extend(rebound);

        self.resolved.lock()?.retain(|key, _| key.component != component);
        self.repositories.insert(component, meta);
        Ok(self)
    }

    /// Register a declarative query.
    ///
    /// When the repository is already registered, an expression query is
    /// bound to its entity here and fails with a configuration error if
    /// neither carries one. Otherwise binding waits for
    /// [`repository`](Self::repository); a query still unbound when it is
    /// resolved fails there.
    pub fn query(&mut self, key: MethodKey, descriptor: QueryDescriptor) -> Result<&mut Self> {
        let descriptor = match self.repositories.get(&key.component) {
            Some(meta) => bind_entity(&descriptor, meta).map_err(|e| qualify(&key, e))?,
            None => {
                if descriptor.validate().is_err() {
                    log::debug!("{}: expression query waits for its repository's entity", key);
                }
                descriptor
            }
        };

        self.invalidate(&key);
        self.queries.insert(key, Arc::new(descriptor));
        Ok(self)
    }

    fn invalidate(&mut self, key: &MethodKey) {
        if let Ok(resolved) = self.resolved.get_mut() {
            resolved.remove(key);
        }
    }

    pub fn query_descriptor(&self, key: &MethodKey) -> Option<Arc<QueryDescriptor>> {
        self.queries.get(key).cloned()
    }

    pub fn repository_meta(&self, component: &str) -> Option<&RepositoryMeta> {
        self.repositories.get(component)
    }

    /// The spec governing `key`, or `None` when no metadata applies.
    pub fn resolve(&self, key: &MethodKey) -> Result<Option<Arc<MethodTxSpec>>> {
        let mut resolved = self.resolved.lock()?;
        if let Some(spec) = resolved.get(key) {
            return Ok(Some(Arc::clone(spec)));
        }

        // a query still waiting for its repository's entity cannot run
        let query = self.queries.get(key);
        if let Some(descriptor) = query {
            descriptor.validate().map_err(|e| qualify(key, e))?;
        }

        let spec = if let Some(spec) = self.explicit.get(key) {
            spec.clone()
        } else if query.is_some() {
            MethodTxSpec::query_default()
        } else if self.repositories.contains_key(&key.component) {
            MethodTxSpec::repository_default()
        } else {
            return Ok(None);
        };

        log::trace!(
            "Resolved {}: {} read_only={}",
            key,
            spec.propagation,
            spec.read_only
        );
        let spec = Arc::new(spec);
        resolved.insert(key.clone(), Arc::clone(&spec));
        Ok(Some(spec))
    }
}

fn bind_entity(descriptor: &QueryDescriptor, meta: &RepositoryMeta) -> Result<QueryDescriptor> {
    let mut bound = descriptor.clone();
    if bound.entity.is_none() {
        bound.entity = meta.entity.clone();
    }
    bound.validate()?;
    Ok(bound)
}

fn qualify(key: &MethodKey, err: TxError) -> TxError {
    match err {
        TxError::Configuration(msg) => TxError::Configuration(format!("{}: {}", key, msg)),
        other => other,
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("explicit", &self.explicit.len())
            .field("repositories", &self.repositories.len())
            .field("queries", &self.queries.len())
            .finish()
    }
}

/// Wraps calls in the transactional behaviour their metadata asks for.
#[derive(Debug, Clone)]
pub struct TransactionalInterceptor {
    manager: SessionManager,
    registry: Arc<MethodRegistry>,
}

impl TransactionalInterceptor {
    pub fn new(manager: SessionManager, registry: Arc<MethodRegistry>) -> Self {
        Self { manager, registry }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Run `body` as the method `key`.
    ///
    /// Without metadata the body runs as a plain call: it sees the active
    /// frame's session, if any, and nothing is opened or finalized.
    pub async fn invoke<'c, T, E, F, Fut>(
        &self,
        ctx: &'c TxContext,
        key: &MethodKey,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: Failure,
        F: FnOnce(TxScope<'c>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let spec = self.registry.resolve(key)?;

        let span = tracing::debug_span!(
            "tx_call",
            method = %key,
            propagation = spec.as_ref().map(|s| s.propagation.as_str()).unwrap_or("NONE"),
        );

        async move {
            match spec {
                Some(spec) => self.manager.transaction(ctx, &spec, body).await,
                None => {
                    log::trace!("{} has no transactional metadata; plain call", key);
                    body(TxScope::new(ctx, ctx.current_session().ok())).await
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::EntityMeta;
    use crate::transaction::Propagation;

    #[test]
    fn test_precedence() {
        let mut registry = MethodRegistry::new();
        registry
            .repository("UserRepository", RepositoryMeta::new())
            .unwrap();
        registry
            .query(
                MethodKey::new("UserRepository", "find_all"),
                QueryDescriptor::sql("SELECT * FROM users"),
            )
            .unwrap();
        registry
            .query(
                MethodKey::new("UserRepository", "find_for_update"),
                QueryDescriptor::sql("SELECT * FROM users"),
            )
            .unwrap();
        registry.transactional(
            MethodKey::new("UserRepository", "find_for_update"),
            MethodTxSpec::new().propagation(Propagation::RequiresNew),
        );

        let query = registry
            .resolve(&MethodKey::new("UserRepository", "find_all"))
            .unwrap()
            .unwrap();
        assert!(query.read_only);
        assert_eq!(query.propagation, Propagation::Required);

        let explicit = registry
            .resolve(&MethodKey::new("UserRepository", "find_for_update"))
            .unwrap()
            .unwrap();
        assert!(!explicit.read_only);
        assert_eq!(explicit.propagation, Propagation::RequiresNew);

        let plain = registry
            .resolve(&MethodKey::new("UserRepository", "save"))
            .unwrap()
            .unwrap();
        assert!(!plain.read_only);

        assert!(registry
            .resolve(&MethodKey::new("Unknown", "run"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_resolution_is_cached() {
        let mut registry = MethodRegistry::new();
        let key = MethodKey::new("Service", "run");
        registry.transactional(key.clone(), MethodTxSpec::new().read_only(true));

        let first = registry.resolve(&key).unwrap().unwrap();
        let second = registry.resolve(&key).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_expr_query_requires_entity() {
        let mut registry = MethodRegistry::new();
        registry.repository("Repo", RepositoryMeta::new()).unwrap();

        let err = registry
            .query(MethodKey::new("Repo", "by_name"), QueryDescriptor::expr("name = :name"))
            .unwrap_err();
        assert!(matches!(err, TxError::Configuration(_)));
    }

    #[test]
    fn test_query_registered_before_its_repository() {
        let mut registry = MethodRegistry::new();
        let key = MethodKey::new("Repo", "by_name");
        registry
            .query(key.clone(), QueryDescriptor::expr("name = :name"))
            .unwrap();

        // unbound until the repository arrives
        assert!(matches!(registry.resolve(&key), Err(TxError::Configuration(_))));

        registry
            .repository("Repo", RepositoryMeta::for_entity(EntityMeta::new("users", &["name"])))
            .unwrap();
        let spec = registry.resolve(&key).unwrap().unwrap();
        assert!(spec.read_only);
        assert_eq!(
            registry.query_descriptor(&key).unwrap().entity.as_ref().unwrap().table,
            "users"
        );
    }

    #[test]
    fn test_entityless_repository_rejects_pending_expr_query() {
        let mut registry = MethodRegistry::new();
        registry
            .query(MethodKey::new("Repo", "by_name"), QueryDescriptor::expr("name = :name"))
            .unwrap();

        let err = registry.repository("Repo", RepositoryMeta::new()).unwrap_err();
        assert!(matches!(err, TxError::Configuration(_)));
    }

    #[test]
    fn test_repository_binds_entity_to_queries() {
        let mut registry = MethodRegistry::new();
        let key = MethodKey::new("Repo", "adults");
        registry
            .query(
                key.clone(),
                QueryDescriptor::expr("age >= 18").with_entity(EntityMeta::new("people", &["age"])),
            )
            .unwrap();
        registry
            .repository(
                "Repo",
                RepositoryMeta::for_entity(EntityMeta::new("users", &["id", "age"])),
            )
            .unwrap();

        // An entity set on the descriptor itself is kept
        let descriptor = registry.query_descriptor(&key).unwrap();
        assert_eq!(descriptor.entity.as_ref().unwrap().table, "people");
    }
}
