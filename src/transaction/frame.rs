use super::isolation::IsolationLevel;
use crate::connection::Session;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Weak};

type Matcher = dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync;

/// A predicate over body failures.
///
/// Rules are checked against the failure and every error in its `source()`
/// chain, so a rule for a low-level error type still matches after the error
/// has been wrapped.
#[derive(Clone)]
pub struct RollbackRule {
    name: String,
    matcher: Arc<Matcher>,
}

impl RollbackRule {
    /// Matches every failure
    pub fn any() -> Self {
        Self {
            name: "any".to_string(),
            matcher: Arc::new(|_| true),
        }
    }

    /// Matches when an `E` appears anywhere in the error chain
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            name: std::any::type_name::<E>().to_string(),
            matcher: Arc::new(|err| err.downcast_ref::<E>().is_some()),
        }
    }

    pub fn when<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            matcher: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        let mut current = Some(err);
        while let Some(e) = current {
            if (self.matcher)(e) {
                return true;
            }
            current = e.source();
        }
        false
    }
}

impl PartialEq for RollbackRule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.matcher, &other.matcher)
    }
}

impl fmt::Debug for RollbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RollbackRule({})", self.name)
    }
}

/// What an owning frame does with its session after the body failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Issue an explicit rollback, then close
    Rollback,
    /// Close without commit or rollback
    CloseOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackPolicy {
    pub rollback_for: Vec<RollbackRule>,
    pub no_rollback_for: Vec<RollbackRule>,
    /// False while `rollback_for` still holds only the implicit `any` rule
    pub(crate) rollback_for_declared: bool,
}

impl RollbackPolicy {
    /// A failure rolls back when it matches `rollback_for` and no
    /// `no_rollback_for` rule. Anything else closes the session bare.
    pub fn classify(&self, err: &(dyn Error + 'static)) -> FailureOutcome {
        let wanted = self.rollback_for.iter().any(|rule| rule.matches(err));
        let suppressed = self.no_rollback_for.iter().any(|rule| rule.matches(err));

        if wanted && !suppressed {
            FailureOutcome::Rollback
        } else {
            FailureOutcome::CloseOnly
        }
    }
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            rollback_for: vec![RollbackRule::any()],
            no_rollback_for: Vec::new(),
            rollback_for_declared: false,
        }
    }
}

/// One active transactional scope bound to a session.
///
/// `parent` points at the frame this one suspended. It is a weak link: the
/// suspended frame is kept alive by the call that suspended it.
#[derive(Debug)]
pub struct TransactionFrame {
    session: Session,
    owns_transaction: bool,
    read_only: bool,
    isolation: Option<IsolationLevel>,
    rollback: RollbackPolicy,
    parent: Option<Weak<TransactionFrame>>,
}

impl TransactionFrame {
    pub fn new(
        session: Session,
        read_only: bool,
        isolation: Option<IsolationLevel>,
        rollback: RollbackPolicy,
    ) -> Self {
        Self {
            session,
            owns_transaction: true,
            read_only,
            isolation,
            rollback,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<&Arc<TransactionFrame>>) -> Self {
        self.parent = parent.map(Arc::downgrade);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn owns_transaction(&self) -> bool {
        self.owns_transaction
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    pub fn rollback_policy(&self) -> &RollbackPolicy {
        &self.rollback
    }

    /// The suspended frame, if it is still alive
    pub fn parent(&self) -> Option<Arc<TransactionFrame>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }
}
