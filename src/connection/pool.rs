use super::{DatabaseSettings, Session};
use crate::core::{Result, TxError};
use crate::interface::Driver;
use crate::storage::MemoryDriver;
use crate::transaction::IsolationLevel;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared handle to a database engine: a driver plus a bounded session pool.
///
/// Cheap to clone. Every clone draws from the same pool, so `pool_size`
/// bounds the number of sessions open at once across the whole application.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    settings: DatabaseSettings,
    driver: Arc<dyn Driver>,
    slots: Arc<Semaphore>,
    sessions_opened: AtomicU64,
}

impl EngineHandle {
    /// Build an engine for `settings.url` using the built-in memory driver.
    pub fn open(settings: DatabaseSettings) -> Result<Self> {
        settings.validate()?;
        let driver = MemoryDriver::from_settings(&settings)?;
        Ok(Self::with_driver(settings, Arc::new(driver)))
    }

    /// Build an engine around an arbitrary driver.
    pub fn with_driver(settings: DatabaseSettings, driver: Arc<dyn Driver>) -> Self {
        let slots = Arc::new(Semaphore::new(settings.pool_size.max(1)));
        log::debug!(
            "Engine created: driver={}, url={}, pool_size={}",
            driver.name(),
            settings.url,
            settings.pool_size
        );

        Self {
            inner: Arc::new(EngineInner {
                settings,
                driver,
                slots,
                sessions_opened: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.inner.settings
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.inner.driver)
    }

    /// True when both handles share one pool.
    pub fn same_engine(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open a session and start a transaction on it.
    pub async fn begin_session(&self, isolation: Option<IsolationLevel>) -> Result<Session> {
        if let Some(level) = isolation {
            if !self.inner.driver.supports_isolation(level) {
                return Err(TxError::TransactionStart(format!(
                    "{} does not support isolation level {}",
                    self.inner.driver.name(),
                    level
                )));
            }
        }

        let session = self.open_session().await?;
        if let Err(e) = session.begin(isolation).await {
            // Never hand out a session that failed to start
            let _ = session.close().await;
            return Err(e);
        }

        log::debug!("Transaction started on {} (isolation={:?})", session.id(), isolation);
        Ok(session)
    }

    /// Open a session in auto-commit mode.
    pub async fn open_session(&self) -> Result<Session> {
        let permit = self.acquire_slot().await?;
        let connection = self.inner.driver.connect().await?;

        let session = Session::new(connection, Some(permit), self.inner.settings.echo);

        if self.inner.settings.pool_pre_ping {
            if let Err(e) = session.ping().await {
                let _ = session.close().await;
                return Err(TxError::Connection(format!("pre-ping failed: {}", e)));
            }
        }

        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        log::trace!("Opened {}", session.id());
        Ok(session)
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        let timeout = self.inner.settings.connect_timeout_duration();
        let acquire = Arc::clone(&self.inner.slots).acquire_owned();

        match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(TxError::Connection("Session pool is closed".into())),
            Err(_) => Err(TxError::Connection(format!(
                "Session pool timeout: no slot available after {:?}",
                timeout
            ))),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let size = self.inner.settings.pool_size.max(1);
        let available = self.inner.slots.available_permits();
        PoolStats {
            pool_size: size,
            available,
            in_use: size.saturating_sub(available),
            sessions_opened: self.inner.sessions_opened.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("driver", &self.inner.driver.name())
            .field("url", &self.inner.settings.url)
            .finish()
    }
}

/// Session pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_size: usize,
    pub available: usize,
    pub in_use: usize,
    /// Sessions opened over the lifetime of the engine
    pub sessions_opened: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} in use, {} available, {} opened",
            self.in_use, self.pool_size, self.available, self.sessions_opened
        )
    }
}
