//! Configurer chain tests
//!
//! Startup hooks run once, in priority order, and may replace the engine
//! the application ends up with.
//! Run with: cargo test --test configurer_tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use txscope::{
    DatabaseConfigurer, DatabaseSettings, EngineHandle, MethodTxSpec, Result, SessionManager, TxContext,
    TxError,
};

struct Tracing {
    label: &'static str,
    priority: i32,
    seen: Arc<Mutex<Vec<&'static str>>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DatabaseConfigurer for Tracing {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        self.label
    }

    async fn configure(&self, _engine: &EngineHandle) -> Result<Option<EngineHandle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(self.label);
        Ok(None)
    }
}

/// Creates the schema on whatever engine it is handed
struct Schema;

#[async_trait]
impl DatabaseConfigurer for Schema {
    fn priority(&self) -> i32 {
        10
    }

    async fn configure(&self, engine: &EngineHandle) -> Result<Option<EngineHandle>> {
        let session = engine.open_session().await?;
        session.query("CREATE TABLE settings (key TEXT, value TEXT)").await?;
        session.close().await?;
        Ok(None)
    }
}

/// Swaps in a differently sized engine
struct Resize(usize);

#[async_trait]
impl DatabaseConfigurer for Resize {
    fn priority(&self) -> i32 {
        -10
    }

    async fn configure(&self, engine: &EngineHandle) -> Result<Option<EngineHandle>> {
        let settings = engine.settings().clone().pool_size(self.0);
        Ok(Some(EngineHandle::with_driver(settings, engine.driver())))
    }
}

struct Failing;

#[async_trait]
impl DatabaseConfigurer for Failing {
    async fn configure(&self, _engine: &EngineHandle) -> Result<Option<EngineHandle>> {
        Err(TxError::Configuration("migration failed".into()))
    }
}

#[tokio::test]
async fn test_configurers_run_once_in_priority_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let hook = |label, priority| Tracing {
        label,
        priority,
        seen: Arc::clone(&seen),
        calls: Arc::clone(&calls),
    };

    let manager = SessionManager::builder(DatabaseSettings::new("memory://"))
        .configurer(hook("late", 100))
        .configurer(hook("first-default", 0))
        .configurer(hook("early", -1))
        .configurer(hook("second-default", 0))
        .build()
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["early", "first-default", "second-default", "late"]
    );

    // running transactions never re-applies configuration
    let ctx = TxContext::new();
    manager
        .transaction(&ctx, &MethodTxSpec::new(), |_scope| async { Ok::<_, TxError>(()) })
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_replacement_engine_is_seen_by_later_hooks_and_the_application() {
    let manager = SessionManager::builder(DatabaseSettings::new("memory://").pool_size(2))
        .configurer(Schema)
        .configurer(Resize(7))
        .build()
        .await
        .unwrap();

    assert_eq!(manager.engine().stats().pool_size, 7);

    // Schema ran after Resize against the replacement, which shares the driver
    let session = manager.engine().open_session().await.unwrap();
    let result = session.query("SELECT COUNT(*) FROM settings").await.unwrap();
    assert_eq!(result.scalar_one().unwrap().as_i64(), Some(0));
}

#[tokio::test]
async fn test_configurer_failure_aborts_build() {
    let err = SessionManager::builder(DatabaseSettings::new("memory://"))
        .configurer(Failing)
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::Configuration(msg) if msg.contains("migration failed")));
}

#[tokio::test]
async fn test_invalid_settings_fail_before_configurers_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let err = SessionManager::builder(DatabaseSettings::new("postgres://localhost/app"))
        .configurer(Tracing {
            label: "never",
            priority: 0,
            seen: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::clone(&calls),
        })
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, TxError::Connection(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
