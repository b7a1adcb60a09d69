// ============================================================================
// Session / Transaction Context Registry
// ============================================================================
//
// "Current transaction" is an explicit value: every logical task owns one
// `TxContext` and passes it down its call chain. A context holds zero or one
// active frame. Tasks never share a context, so no task can observe another
// task's frame.
//
// ============================================================================

use super::frame::TransactionFrame;
use crate::connection::Session;
use crate::core::{Result, TxError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Per-task registry slot
///
/// Deliberately not `Clone`: spawn a new task with [`TxContext::new`] (or
/// [`TxContext::fork`]) rather than sharing the parent's slot.
pub struct TxContext {
    task_id: Uuid,
    slot: Mutex<Option<Arc<TransactionFrame>>>,
}

impl TxContext {
    pub fn new() -> Self {
        Self {
            task_id: Uuid::new_v4(),
            slot: Mutex::new(None),
        }
    }

    /// Fresh, empty context for a spawned task.
    ///
    /// The child starts without a frame whatever the parent's state.
    pub fn fork(&self) -> Self {
        let child = Self::new();
        log::trace!("Context {} forked from {}", child.task_id, self.task_id);
        child
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<TransactionFrame>>> {
        // The slot is a single Option; a panic elsewhere cannot leave it torn
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active frame, if any
    pub fn current(&self) -> Option<Arc<TransactionFrame>> {
        self.slot().clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot().is_some()
    }

    /// Install `frame` as current. The slot must be empty.
    pub fn push(&self, frame: Arc<TransactionFrame>) -> Result<()> {
        let mut slot = self.slot();
        if let Some(active) = slot.as_ref() {
            return Err(TxError::IllegalState(format!(
                "cannot push a frame over active {} in context {}",
                active.session().id(),
                self.task_id
            )));
        }

        log::trace!(
            "Context {}: push frame on {}",
            self.task_id,
            frame.session().id()
        );
        *slot = Some(frame);
        Ok(())
    }

    /// Remove and return the active frame
    pub fn pop(&self) -> Result<Arc<TransactionFrame>> {
        let frame = self.slot().take().ok_or_else(|| {
            TxError::IllegalState(format!("no active frame to pop in context {}", self.task_id))
        })?;

        log::trace!(
            "Context {}: pop frame on {}",
            self.task_id,
            frame.session().id()
        );
        Ok(frame)
    }

    /// Detach the active frame without touching its session.
    pub fn suspend(&self) -> Option<Arc<TransactionFrame>> {
        let frame = self.slot().take();
        if let Some(f) = frame.as_ref() {
            log::debug!(
                "Context {}: suspended transaction on {}",
                self.task_id,
                f.session().id()
            );
        }
        frame
    }

    /// Reinstall a frame detached by [`TxContext::suspend`].
    pub fn resume(&self, frame: Arc<TransactionFrame>) -> Result<()> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(TxError::IllegalState(format!(
                "cannot resume {} while another frame is active in context {}",
                frame.session().id(),
                self.task_id
            )));
        }

        log::debug!(
            "Context {}: resumed transaction on {}",
            self.task_id,
            frame.session().id()
        );
        *slot = Some(frame);
        Ok(())
    }

    /// The session of the active frame
    pub fn current_session(&self) -> Result<Session> {
        self.slot()
            .as_ref()
            .map(|frame| frame.session().clone())
            .ok_or(TxError::NoActiveSession)
    }
}

impl Default for TxContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("task_id", &self.task_id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// What an intercepted body runs against.
///
/// `session` is the joined frame's session, the newly created frame's
/// session, or a bare session. It is absent only for calls that run
/// uninterpreted.
pub struct TxScope<'c> {
    ctx: &'c TxContext,
    session: Option<Session>,
}

impl<'c> TxScope<'c> {
    pub(crate) fn new(ctx: &'c TxContext, session: Option<Session>) -> Self {
        Self { ctx, session }
    }

    pub fn context(&self) -> &'c TxContext {
        self.ctx
    }

    pub fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(TxError::NoActiveSession)
    }

    /// True when the scope's session is the active frame's session.
    pub fn in_transaction(&self) -> bool {
        match (self.session.as_ref(), self.ctx.current()) {
            (Some(session), Some(frame)) => session.same_as(frame.session()),
            _ => false,
        }
    }
}

impl fmt::Debug for TxScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxScope")
            .field("task_id", &self.ctx.task_id())
            .field("session", &self.session.as_ref().map(Session::id))
            .finish()
    }
}
