//! Propagation tests
//!
//! End-to-end behaviour of the six propagation modes against a recording
//! driver and the memory backend.
//! Run with: cargo test --test propagation_tests

mod common;

use common::{Event, recording_manager, users_manager};
use std::sync::Arc;
use txscope::{
    Failure, IsolationLevel, MethodKey, MethodRegistry, MethodTxSpec, Params, Propagation, RollbackRule,
    Session, SessionManager, TransactionalInterceptor, TxContext, TxError, Value,
};

#[derive(Debug, thiserror::Error)]
#[error("validation failed: {0}")]
struct ValidationError(String);

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("invalid input")]
    Validation(#[from] ValidationError),
    #[error("payment declined")]
    Declined,
    #[error(transparent)]
    Tx(#[from] TxError),
}

impl Failure for AppError {
    fn as_error(&self) -> &(dyn std::error::Error + 'static) {
        self
    }
}

async fn user_count(manager: &SessionManager) -> i64 {
    let session = manager.engine().open_session().await.unwrap();
    let result = session.query("SELECT COUNT(*) FROM users").await.unwrap();
    session.close().await.unwrap();
    match result.scalar_one().unwrap() {
        Value::Integer(n) => *n,
        other => panic!("unexpected count {:?}", other),
    }
}

async fn insert_user(session: &Session, id: i64, name: &str) -> Result<(), TxError> {
    session
        .query_with(
            "INSERT INTO users (id, name) VALUES (:id, :name)",
            Params::new().bind("id", id).bind("name", name),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_required_nested_calls_share_one_transaction() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let spec = MethodTxSpec::new();

    let m = &manager;
    let s = &spec;
    let (outer, inner) = manager
        .transaction(&ctx, &spec, |scope| async move {
            let outer = scope.session()?.clone();
            let inner = m
                .transaction(scope.context(), s, |inner| async move {
                    assert!(inner.in_transaction());
                    Ok::<_, TxError>(inner.session()?.clone())
                })
                .await?;
            Ok::<_, TxError>((outer, inner))
        })
        .await
        .unwrap();

    assert!(outer.same_as(&inner));
    assert_eq!(log.connects(), 1);
    assert_eq!(log.begins(), 1);
    assert_eq!(log.commits(), 1);
    assert_eq!(log.closes(), 1);
    assert!(ctx.current().is_none());
}

#[tokio::test]
async fn test_requires_new_commits_independently_of_failing_caller() {
    let manager = users_manager().await;
    let ctx = TxContext::new();

    let m = &manager;
    let result = manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            insert_user(scope.session()?, 1, "outer").await?;

            let outer_session = scope.session()?.clone();
            let audit = MethodTxSpec::new().propagation(Propagation::RequiresNew);
            m.transaction(scope.context(), &audit, |inner| async move {
                assert!(!inner.session()?.same_as(&outer_session));
                insert_user(inner.session()?, 2, "audit").await
            })
            .await?;

            // the caller's frame is back in place
            assert!(scope.in_transaction());
            Err::<(), _>(TxError::InvalidArgument("outer fails".into()))
        })
        .await;

    assert!(matches!(result, Err(TxError::InvalidArgument(_))));
    assert_eq!(user_count(&manager).await, 1);

    let session = manager.engine().open_session().await.unwrap();
    let names = session.query("SELECT name FROM users").await.unwrap();
    assert_eq!(names.rows, vec![vec![Value::Text("audit".into())]]);
}

#[tokio::test]
async fn test_requires_new_failure_rolls_back_only_the_inner_call() {
    let manager = users_manager().await;
    let ctx = TxContext::new();

    let m = &manager;
    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            insert_user(scope.session()?, 1, "outer").await?;

            let audit = MethodTxSpec::new().propagation(Propagation::RequiresNew);
            let inner = m
                .transaction(scope.context(), &audit, |inner| async move {
                    insert_user(inner.session()?, 2, "audit").await?;
                    Err::<(), _>(TxError::InvalidArgument("audit rejected".into()))
                })
                .await;
            assert!(matches!(inner, Err(TxError::InvalidArgument(_))));

            // the caller carries on in its own transaction
            assert!(scope.in_transaction());
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    let session = manager.engine().open_session().await.unwrap();
    let names = session.query("SELECT name FROM users").await.unwrap();
    assert_eq!(names.rows, vec![vec![Value::Text("outer".into())]]);
}

#[tokio::test]
async fn test_failed_commit_replaces_the_result_and_releases_the_session() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    log.refuse_commits(true);

    let err = manager
        .transaction(&ctx, &MethodTxSpec::new(), |_scope| async { Ok::<_, TxError>(42) })
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::Connection(msg) if msg.contains("refused COMMIT")));
    assert!(ctx.current().is_none());
    assert_eq!(log.closes(), 1);
    assert_eq!(manager.engine().stats().in_use, 0);
}

#[tokio::test]
async fn test_failed_inner_commit_resumes_the_suspended_caller() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;
    let l = &log;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let outer = scope.context().current().unwrap();
            let spec = MethodTxSpec::new().propagation(Propagation::RequiresNew);

            l.refuse_commits(true);
            let inner = m
                .transaction(scope.context(), &spec, |_inner| async { Ok::<_, TxError>(()) })
                .await;
            l.refuse_commits(false);

            assert!(matches!(inner, Err(TxError::Connection(_))));
            assert!(Arc::ptr_eq(&scope.context().current().unwrap(), &outer));
            assert_eq!(m.engine().stats().in_use, 1);
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(log.commits(), 2);
    assert_eq!(log.closes(), 2);
    assert!(ctx.current().is_none());
    assert_eq!(manager.engine().stats().in_use, 0);
}

#[tokio::test]
async fn test_requires_new_suspends_and_restores_the_caller() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let outer = scope.context().current().unwrap();
            let suspended = Arc::clone(&outer);
            let spec = MethodTxSpec::new().propagation(Propagation::RequiresNew);

            m.transaction(scope.context(), &spec, |inner| async move {
                let frame = inner.context().current().unwrap();
                assert!(!Arc::ptr_eq(&frame, &suspended));
                assert!(frame.has_parent());
                Ok::<_, TxError>(())
            })
            .await?;

            assert!(Arc::ptr_eq(&scope.context().current().unwrap(), &outer));
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(log.connects(), 2);
    assert_eq!(log.begins(), 2);
    assert_eq!(log.commits(), 2);
    assert_eq!(log.closes(), 2);

    // inner commits and closes before the outer does
    let events = log.all();
    let inner_close = events.iter().position(|e| *e == Event::Close(2)).unwrap();
    let outer_commit = events.iter().position(|e| *e == Event::Commit(1)).unwrap();
    assert!(inner_close < outer_commit);
}

#[tokio::test]
async fn test_mandatory_and_never_violations() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();

    let mandatory = MethodTxSpec::new().propagation(Propagation::Mandatory);
    let err = manager
        .transaction(&ctx, &mandatory, |_scope| async { Ok::<_, TxError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Mandatory));
    assert_eq!(log.connects(), 0);

    let m = &manager;
    let err = manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let never = MethodTxSpec::new().propagation(Propagation::Never);
            m.transaction(scope.context(), &never, |_inner| async { Ok::<_, TxError>(()) })
                .await
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Never));

    // the outer transaction saw a failure and rolled back
    assert_eq!(log.rollbacks(), 1);
    assert_eq!(log.commits(), 0);
    assert!(ctx.current().is_none());
}

#[tokio::test]
async fn test_mandatory_joins_and_never_runs_bare() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let mandatory = MethodTxSpec::new().propagation(Propagation::Mandatory);
            let joined = m
                .transaction(scope.context(), &mandatory, |inner| async move {
                    Ok::<_, TxError>(inner.session()?.clone())
                })
                .await?;
            assert!(joined.same_as(scope.session()?));
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    let never = MethodTxSpec::new().propagation(Propagation::Never);
    manager
        .transaction(&ctx, &never, |scope| async move {
            assert!(!scope.in_transaction());
            scope.session()?.query("SELECT 1").await?;
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(log.begins(), 1);
    assert_eq!(log.connects(), 2);
}

#[tokio::test]
async fn test_no_rollback_for_closes_without_commit_or_rollback() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let spec = MethodTxSpec::new().no_rollback_for(RollbackRule::of::<ValidationError>());

    let err = manager
        .transaction(&ctx, &spec, |_scope| async {
            Err::<(), _>(AppError::from(ValidationError("bad email".into())))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(log.begins(), 1);
    assert_eq!(log.commits(), 0);
    assert_eq!(log.rollbacks(), 0);
    assert_eq!(log.closes(), 1);
}

#[tokio::test]
async fn test_rollback_for_restricts_which_failures_roll_back() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let spec = MethodTxSpec::new().rollback_for(RollbackRule::when("declined", |e| {
        matches!(e.downcast_ref::<AppError>(), Some(AppError::Declined))
    }));

    manager
        .transaction(&ctx, &spec, |_scope| async { Err::<(), _>(AppError::Declined) })
        .await
        .unwrap_err();
    assert_eq!(log.rollbacks(), 1);

    // a failure outside rollback_for is closed without rollback
    manager
        .transaction(&ctx, &spec, |_scope| async {
            Err::<(), _>(AppError::from(ValidationError("x".into())))
        })
        .await
        .unwrap_err();
    assert_eq!(log.rollbacks(), 1);
    assert_eq!(log.closes(), 2);
    assert_eq!(log.commits(), 0);
}

#[tokio::test]
async fn test_rolled_back_writes_are_gone() {
    let manager = users_manager().await;
    let ctx = TxContext::new();

    let result = manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            insert_user(scope.session()?, 1, "alice").await?;
            Err::<(), _>(anyhow::anyhow!("boom"))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(user_count(&manager).await, 0);
}

#[tokio::test]
async fn test_read_only_skips_commit() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let spec = MethodTxSpec::new().read_only(true);

    manager
        .transaction(&ctx, &spec, |scope| async move {
            scope.session()?.query("SELECT 1").await?;
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(log.begins(), 1);
    assert_eq!(log.commits(), 0);
    assert_eq!(log.rollbacks(), 0);
    assert_eq!(log.closes(), 1);
}

#[tokio::test]
async fn test_not_supported_suspends_and_runs_bare() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let outer = scope.context().current().unwrap();
            let spec = MethodTxSpec::new().propagation(Propagation::NotSupported);

            m.transaction(scope.context(), &spec, |inner| async move {
                assert!(inner.context().current().is_none());
                assert!(!inner.in_transaction());
                inner.session()?.query("SELECT 1").await?;
                Ok::<_, TxError>(())
            })
            .await?;

            assert!(Arc::ptr_eq(&scope.context().current().unwrap(), &outer));
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    // the bare connection never began a transaction
    let bare = log.connection_of("SELECT 1").unwrap();
    assert!(log
        .for_connection(bare)
        .iter()
        .all(|e| !matches!(e, Event::Begin(..) | Event::Commit(_))));
    assert_eq!(log.begins(), 1);
    assert_eq!(log.commits(), 1);
}

#[tokio::test]
async fn test_supports_joins_an_active_transaction() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let supports = MethodTxSpec::new().propagation(Propagation::Supports);
            m.transaction(scope.context(), &supports, |inner| async move {
                assert!(inner.in_transaction());
                Ok::<_, TxError>(())
            })
            .await
        })
        .await
        .unwrap();

    assert_eq!(log.connects(), 1);
}

#[tokio::test]
async fn test_required_inside_bare_supports_starts_a_transaction() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    // SUPPORTS without a transaction opens a bare session; REQUIRED inside
    // it still starts a real transaction
    manager
        .transaction(&ctx, &MethodTxSpec::new().propagation(Propagation::Supports), |scope| async move {
            m.transaction(scope.context(), &MethodTxSpec::new(), |inner| async move {
                assert!(inner.in_transaction());
                Ok::<_, TxError>(())
            })
            .await
        })
        .await
        .unwrap();

    assert_eq!(log.begins(), 1);
    assert_eq!(log.commits(), 1);
}

#[tokio::test]
async fn test_isolation_level_reaches_the_driver() {
    let (manager, log) = recording_manager().await;
    let ctx = TxContext::new();
    let spec = MethodTxSpec::new().isolation_level(IsolationLevel::Serializable);

    manager
        .transaction(&ctx, &spec, |_scope| async { Ok::<_, TxError>(()) })
        .await
        .unwrap();
    assert!(log
        .all()
        .contains(&Event::Begin(1, Some(IsolationLevel::Serializable))));

    let unsupported = MethodTxSpec::new().isolation_level(IsolationLevel::ReadUncommitted);
    let err = manager
        .transaction(&ctx, &unsupported, |_scope| async { Ok::<_, TxError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::TransactionStart(_)));
    assert_eq!(log.connects(), 1);
}

#[tokio::test]
async fn test_contexts_are_isolated_across_tasks() {
    let manager = users_manager().await;
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    let mut handles = Vec::new();
    for id in 0..2i64 {
        let manager = manager.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            let ctx = TxContext::new();
            manager
                .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
                    insert_user(scope.session()?, id, "worker").await?;
                    // both frames are active at once
                    barrier.wait().await;
                    Ok::<_, TxError>(scope.session()?.id())
                })
                .await
        }));
    }

    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap().unwrap());
    }

    assert_ne!(sessions[0], sessions[1]);
    assert_eq!(user_count(&manager).await, 2);
}

#[tokio::test]
async fn test_forked_context_starts_without_a_frame() {
    let manager = users_manager().await;
    let ctx = TxContext::new();
    let m = &manager;

    manager
        .transaction(&ctx, &MethodTxSpec::new(), |scope| async move {
            let child = scope.context().fork();
            assert!(child.current().is_none());

            let mandatory = MethodTxSpec::new().propagation(Propagation::Mandatory);
            let err = m
                .transaction(&child, &mandatory, |_s| async { Ok::<_, TxError>(()) })
                .await
                .unwrap_err();
            assert!(matches!(err, TxError::Mandatory));
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_interceptor_runs_unregistered_calls_plainly() {
    let (manager, log) = recording_manager().await;
    let mut registry = MethodRegistry::new();
    registry.transactional(
        MethodKey::new("BillingService", "charge"),
        MethodTxSpec::new().propagation(Propagation::RequiresNew),
    );
    let interceptor = TransactionalInterceptor::new(manager, Arc::new(registry));
    let ctx = TxContext::new();

    let helper = MethodKey::new("BillingService", "format");
    let err = interceptor
        .invoke(&ctx, &helper, |scope| async move { scope.session().map(|s| s.id()) })
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::NoActiveSession));
    assert_eq!(log.connects(), 0);

    // inside a registered method the helper sees the caller's session
    let i = &interceptor;
    let helper = &helper;
    interceptor
        .invoke(&ctx, &MethodKey::new("BillingService", "charge"), |scope| async move {
            let seen = i
                .invoke(scope.context(), helper, |inner| async move {
                    Ok::<_, TxError>(inner.session()?.clone())
                })
                .await?;
            assert!(seen.same_as(scope.session()?));
            Ok::<_, TxError>(())
        })
        .await
        .unwrap();

    assert_eq!(log.connects(), 1);
    assert_eq!(log.commits(), 1);
}
