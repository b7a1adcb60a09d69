use std::time::Duration;
use serde::Deserialize;
use crate::core::{Result, TxError};

pub const MEMORY_SCHEME: &str = "memory://";

/// Engine construction settings.
///
/// Mirrors the `database` section of an application configuration document:
///
/// ```json
/// { "database": { "url": "memory://app", "echo": true, "pool_size": 5 } }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection URL. Only `memory://<name>` is understood by the built-in driver.
    pub url: String,

    /// Log every executed statement at info level.
    pub echo: bool,

    /// Maximum number of sessions open at the same time.
    pub pool_size: usize,

    /// Ping connections before handing them out.
    pub pool_pre_ping: bool,

    /// Recycle connections older than this many seconds (driver-dependent).
    pub pool_recycle: u64,

    /// How long to wait for a free pool slot, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl DatabaseSettings {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn pool_pre_ping(mut self, enabled: bool) -> Self {
        self.pool_pre_ping = enabled;
        self
    }

    pub fn pool_recycle(mut self, seconds: u64) -> Self {
        self.pool_recycle = seconds;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parse a bare connection string.
    pub fn from_url(url: &str) -> Result<Self> {
        let settings = Self::new(url);
        settings.database_name()?;
        Ok(settings)
    }

    /// Read the `database` section of a JSON configuration document.
    pub fn from_json(document: &serde_json::Value) -> Result<Self> {
        let section = document
            .get("database")
            .ok_or_else(|| TxError::Configuration("missing 'database' section".into()))?;

        let settings: Self = serde_json::from_value(section.clone())
            .map_err(|e| TxError::Configuration(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Name of the in-memory database this URL addresses.
    ///
    /// An empty name (`memory://`) means a private, unnamed database.
    pub fn database_name(&self) -> Result<Option<String>> {
        let Some(rest) = self.url.strip_prefix(MEMORY_SCHEME) else {
            return Err(TxError::Connection(format!(
                "Unsupported connection URL '{}': expected '{}<name>'",
                self.url, MEMORY_SCHEME
            )));
        };

        if rest.is_empty() {
            return Ok(None);
        }

        if !rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TxError::Connection(format!(
                "Malformed database name in URL '{}'",
                self.url
            )));
        }

        Ok(Some(rest.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(TxError::Configuration("url cannot be empty".into()));
        }

        if self.pool_size == 0 {
            return Err(TxError::Configuration("pool_size must be > 0".into()));
        }

        Ok(())
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: MEMORY_SCHEME.to_string(),
            echo: false,
            pool_size: 5,
            pool_pre_ping: true,
            pool_recycle: 3600,
            connect_timeout_ms: 30_000,
        }
    }
}
