//! Shared fixtures for the integration tests
//!
//! `RecordingDriver` wraps the memory backend and records every protocol
//! call, so tests can assert on BEGIN/COMMIT/ROLLBACK/close ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use txscope::{
    DatabaseSettings, Driver, DriverConnection, IsolationLevel, MemoryDriver, QueryResult, Result,
    SessionManager, Statement, TxError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(usize),
    Begin(usize, Option<IsolationLevel>),
    Commit(usize),
    Rollback(usize),
    Execute(usize, String),
    Close(usize),
}

impl Event {
    pub fn connection(&self) -> usize {
        match self {
            Event::Connect(c)
            | Event::Begin(c, _)
            | Event::Commit(c)
            | Event::Rollback(c)
            | Event::Execute(c, _)
            | Event::Close(c) => *c,
        }
    }
}

#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
    refuse_commits: Arc<AtomicBool>,
}

impl EventLog {
    /// While set, every COMMIT is recorded and then fails
    pub fn refuse_commits(&self, refuse: bool) {
        self.refuse_commits.store(refuse, Ordering::SeqCst);
    }

    fn commit_refused(&self) -> bool {
        self.refuse_commits.load(Ordering::SeqCst)
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.all().iter().filter(|e| pred(e)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|e| matches!(e, Event::Connect(_)))
    }

    pub fn begins(&self) -> usize {
        self.count(|e| matches!(e, Event::Begin(..)))
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(_)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(_)))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(_)))
    }

    /// Events of one connection, in order
    pub fn for_connection(&self, connection: usize) -> Vec<Event> {
        self.all()
            .into_iter()
            .filter(|e| e.connection() == connection)
            .collect()
    }

    /// Connection that executed a statement containing `needle`
    pub fn connection_of(&self, needle: &str) -> Option<usize> {
        self.all().into_iter().find_map(|e| match e {
            Event::Execute(c, sql) if sql.contains(needle) => Some(c),
            _ => None,
        })
    }
}

pub struct RecordingDriver {
    inner: MemoryDriver,
    log: EventLog,
    next_id: AtomicUsize,
}

impl RecordingDriver {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryDriver::new(),
            log,
            next_id: AtomicUsize::new(1),
        }
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn supports_isolation(&self, level: IsolationLevel) -> bool {
        self.inner.supports_isolation(level)
    }

    async fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::Connect(id));
        Ok(Box::new(RecordingConnection {
            id,
            inner: self.inner.connect().await?,
            log: self.log.clone(),
        }))
    }
}

struct RecordingConnection {
    id: usize,
    inner: Box<dyn DriverConnection>,
    log: EventLog,
}

#[async_trait]
impl DriverConnection for RecordingConnection {
    async fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()> {
        self.log.push(Event::Begin(self.id, isolation));
        self.inner.begin(isolation).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.log.push(Event::Commit(self.id));
        if self.log.commit_refused() {
            return Err(TxError::Connection(format!("connection {} refused COMMIT", self.id)));
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.log.push(Event::Rollback(self.id));
        self.inner.rollback().await
    }

    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult> {
        self.log.push(Event::Execute(self.id, statement.sql.clone()));
        self.inner.execute(statement).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.inner.ping().await
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push(Event::Close(self.id));
        self.inner.close().await
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

/// Manager over a private recording database, plus its event log
pub async fn recording_manager() -> (SessionManager, EventLog) {
    let log = EventLog::default();
    let manager = SessionManager::builder(DatabaseSettings::new("memory://").pool_size(8))
        .driver(Arc::new(RecordingDriver::new(log.clone())))
        .build()
        .await
        .unwrap();
    (manager, log)
}

/// Manager over a private memory database with a `users` table
pub async fn users_manager() -> SessionManager {
    let manager = SessionManager::builder(DatabaseSettings::new("memory://"))
        .build()
        .await
        .unwrap();
    let session = manager.engine().open_session().await.unwrap();
    session
        .query("CREATE TABLE users (id INTEGER NOT NULL, name TEXT, age INTEGER, active BOOLEAN)")
        .await
        .unwrap();
    session.close().await.unwrap();
    manager
}
