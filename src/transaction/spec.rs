use super::frame::{RollbackPolicy, RollbackRule};
use super::isolation::IsolationLevel;
use super::propagation::Propagation;

/// Resolved transactional configuration for one callable
///
/// Built once at startup and shared immutably afterwards.
///
/// ```
/// use txscope::{MethodTxSpec, Propagation, RollbackRule};
///
/// let spec = MethodTxSpec::new()
///     .propagation(Propagation::RequiresNew)
///     .no_rollback_for(RollbackRule::of::<std::io::Error>());
/// assert!(!spec.read_only);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MethodTxSpec {
    pub propagation: Propagation,
    pub read_only: bool,
    pub isolation_level: Option<IsolationLevel>,
    pub rollback: RollbackPolicy,
}

impl MethodTxSpec {
    pub fn new() -> Self {
        Self {
            propagation: Propagation::Required,
            read_only: false,
            isolation_level: None,
            rollback: RollbackPolicy::default(),
        }
    }

    /// Default for declarative query methods
    pub fn query_default() -> Self {
        Self::new().read_only(true)
    }

    /// Default for methods of a repository component
    pub fn repository_default() -> Self {
        Self::new()
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    /// Replace the rollback rules. The first call drops the default `any` rule;
    /// later calls add to the list.
    pub fn rollback_for(mut self, rule: RollbackRule) -> Self {
        if !self.rollback.rollback_for_declared {
            self.rollback.rollback_for.clear();
            self.rollback.rollback_for_declared = true;
        }
        self.rollback.rollback_for.push(rule);
        self
    }

    pub fn no_rollback_for(mut self, rule: RollbackRule) -> Self {
        self.rollback.no_rollback_for.push(rule);
        self
    }
}

impl Default for MethodTxSpec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TxError;

    #[test]
    fn test_defaults() {
        let spec = MethodTxSpec::new();
        assert_eq!(spec.propagation, Propagation::Required);
        assert!(!spec.read_only);
        assert!(spec.isolation_level.is_none());
        assert_eq!(spec.rollback.rollback_for.len(), 1);
        assert!(spec.rollback.no_rollback_for.is_empty());

        assert!(MethodTxSpec::query_default().read_only);
        assert!(!MethodTxSpec::repository_default().read_only);
    }

    #[test]
    fn test_rollback_for_replaces_default() {
        let spec = MethodTxSpec::new()
            .rollback_for(RollbackRule::of::<TxError>())
            .rollback_for(RollbackRule::of::<std::io::Error>());
        let names: Vec<&str> = spec.rollback.rollback_for.iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), 2);
        assert!(!names.contains(&"any"));
    }

    #[test]
    fn test_rule_named_any_is_kept() {
        let spec = MethodTxSpec::new()
            .rollback_for(RollbackRule::when("any", |e| e.downcast_ref::<TxError>().is_some()))
            .rollback_for(RollbackRule::of::<std::io::Error>());
        assert_eq!(spec.rollback.rollback_for.len(), 2);
        assert_eq!(spec.rollback.rollback_for[0].name(), "any");

        let io = std::io::Error::other("disk");
        assert!(spec.rollback.rollback_for.iter().any(|r| r.matches(&io)));
        assert!(spec.rollback.rollback_for[0].matches(&TxError::NoActiveSession));
    }
}
