// ============================================================================
// Session Manager
// ============================================================================
//
// Drives one call through the propagation protocol:
//
//   decide -> (suspend) -> open/begin -> push -> body -> commit|rollback|close
//          -> pop -> (resume)
//
// Registry transitions are undone by drop guards as well, so a cancelled
// body never leaves a stale frame behind in the caller's context.
//
// ============================================================================

use super::context::{TxContext, TxScope};
use super::frame::{FailureOutcome, TransactionFrame};
use super::propagation::{Action, decide};
use super::spec::MethodTxSpec;
use crate::configurer::{self, DatabaseConfigurer};
use crate::connection::{DatabaseSettings, EngineHandle, Session};
use crate::core::{Failure, Result, TxError};
use crate::interface::Driver;
use std::future::Future;
use std::sync::Arc;

/// Owns the configured engine and runs bodies under propagation rules.
#[derive(Debug, Clone)]
pub struct SessionManager {
    engine: EngineHandle,
}

impl SessionManager {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn builder(settings: DatabaseSettings) -> SessionManagerBuilder {
        SessionManagerBuilder::new(settings)
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// The session of the calling task's active frame
    pub fn current_session(&self, ctx: &TxContext) -> Result<Session> {
        ctx.current_session()
    }

    /// Run `body` under `spec`.
    ///
    /// Engine failures reach the caller through `E: From<TxError>`; body
    /// failures are returned unchanged after finalization unless finalization
    /// itself fails.
    pub async fn transaction<'c, T, E, F, Fut>(
        &self,
        ctx: &'c TxContext,
        spec: &MethodTxSpec,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: Failure,
        F: FnOnce(TxScope<'c>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let current = ctx.current();
        let action = decide(spec.propagation, current.as_deref());

        log::debug!(
            "{}: context {} {} -> {:?}",
            spec.propagation,
            ctx.task_id(),
            if current.is_some() { "ACTIVE" } else { "NONE" },
            action
        );

        match action {
            Action::Fail(kind) => {
                log::error!("{} propagation violated in context {}", spec.propagation, ctx.task_id());
                Err(E::from(kind.into_error()))
            }

            Action::Join => {
                // Checked by decide; a missing frame here is a sequencing bug
                let frame = current.ok_or_else(|| {
                    TxError::IllegalState("join requested without an active frame".into())
                })?;
                log::debug!("{}: joining transaction on {}", spec.propagation, frame.session().id());
                body(TxScope::new(ctx, Some(frame.session().clone()))).await
            }

            Action::Create => self.run_owned(ctx, spec, None, body).await,

            Action::CreateSuspending { managed } => {
                let suspension = Suspension::begin(ctx);
                let outcome = if managed {
                    self.run_owned(ctx, spec, suspension.parent(), body).await
                } else {
                    self.run_bare(ctx, body).await
                };
                let resumed = suspension.finish();

                match (outcome, resumed) {
                    (outcome, Ok(())) => outcome,
                    (_, Err(e)) => Err(E::from(e)),
                }
            }

            Action::RunBare => self.run_bare(ctx, body).await,
        }
    }

    async fn run_owned<'c, T, E, F, Fut>(
        &self,
        ctx: &'c TxContext,
        spec: &MethodTxSpec,
        parent: Option<Arc<TransactionFrame>>,
        body: F,
    ) -> std::result::Result<T, E>
    where
        E: Failure,
        F: FnOnce(TxScope<'c>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let session = self.engine.begin_session(spec.isolation_level).await?;
        let frame = Arc::new(
            TransactionFrame::new(
                session.clone(),
                spec.read_only,
                spec.isolation_level,
                spec.rollback.clone(),
            )
            .with_parent(parent.as_ref()),
        );

        if let Err(e) = ctx.push(Arc::clone(&frame)) {
            let _ = session.close().await;
            return Err(E::from(e));
        }
        log::debug!(
            "New transaction started on {} (read_only={}, isolation={:?})",
            session.id(),
            spec.read_only,
            spec.isolation_level
        );

        let guard = PushedFrame::new(ctx, Arc::clone(&frame));
        let outcome = body(TxScope::new(ctx, Some(session.clone()))).await;

        // Classify before awaiting: the failure is only borrowed here
        let failure = outcome.as_ref().err().map(|e| {
            let err = e.as_error();
            (frame.rollback_policy().classify(err), err.to_string())
        });
        let finalized = match failure {
            None => self.finish_success(&frame).await,
            Some((verdict, reason)) => self.finish_failure(&frame, verdict, &reason).await,
        };
        let popped = guard.pop();

        match (outcome, finalized.and(popped)) {
            (outcome, Ok(())) => outcome,
            (_, Err(e)) => {
                log::error!("Finalization failed on {}: {}", session.id(), e);
                Err(E::from(e))
            }
        }
    }

    async fn run_bare<'c, T, E, F, Fut>(&self, ctx: &'c TxContext, body: F) -> std::result::Result<T, E>
    where
        E: Failure,
        F: FnOnce(TxScope<'c>) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let session = self.engine.open_session().await?;
        log::debug!("Running without transaction on {}", session.id());

        let outcome = body(TxScope::new(ctx, Some(session.clone()))).await;
        let closed = session.close().await;

        match (outcome, closed) {
            (outcome, Ok(())) => outcome,
            (_, Err(e)) => Err(E::from(e)),
        }
    }

    async fn finish_success(&self, frame: &TransactionFrame) -> Result<()> {
        let session = frame.session();
        let committed = if frame.is_read_only() {
            log::debug!("Read-only transaction on {}: skipping commit", session.id());
            Ok(())
        } else {
            log::debug!("Committing transaction on {}", session.id());
            session.commit().await
        };

        let closed = session.close().await;
        committed.and(closed)
    }

    async fn finish_failure(
        &self,
        frame: &TransactionFrame,
        verdict: FailureOutcome,
        reason: &str,
    ) -> Result<()> {
        let session = frame.session();
        let rolled_back = match verdict {
            FailureOutcome::Rollback => {
                log::warn!("Rolling back transaction on {} due to: {}", session.id(), reason);
                session.rollback().await
            }
            FailureOutcome::CloseOnly => {
                log::debug!(
                    "Failure on {} not rolled back ({}); closing session",
                    session.id(),
                    reason
                );
                Ok(())
            }
        };

        let closed = session.close().await;
        rolled_back.and(closed)
    }
}

/// Pops an owning frame exactly once, on the normal path or on drop.
struct PushedFrame<'c> {
    ctx: &'c TxContext,
    frame: Option<Arc<TransactionFrame>>,
}

impl<'c> PushedFrame<'c> {
    fn new(ctx: &'c TxContext, frame: Arc<TransactionFrame>) -> Self {
        Self {
            ctx,
            frame: Some(frame),
        }
    }

    fn pop(mut self) -> Result<()> {
        let Some(expected) = self.frame.take() else {
            return Ok(());
        };

        let popped = self.ctx.pop()?;
        if !Arc::ptr_eq(&popped, &expected) {
            return Err(TxError::IllegalState(format!(
                "popped frame on {} but expected {}",
                popped.session().id(),
                expected.session().id()
            )));
        }
        Ok(())
    }
}

impl Drop for PushedFrame<'_> {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            // Cancelled mid-body: the session's connection discards its
            // transaction when the last handle goes away
            log::warn!(
                "Transaction on {} abandoned before finalization; discarding",
                frame.session().id()
            );
            let _ = self.ctx.pop();
        }
    }
}

/// Holds a suspended parent frame and puts it back exactly once.
struct Suspension<'c> {
    ctx: &'c TxContext,
    parent: Option<Arc<TransactionFrame>>,
    done: bool,
}

impl<'c> Suspension<'c> {
    fn begin(ctx: &'c TxContext) -> Self {
        Self {
            ctx,
            parent: ctx.suspend(),
            done: false,
        }
    }

    fn parent(&self) -> Option<Arc<TransactionFrame>> {
        self.parent.clone()
    }

    fn finish(mut self) -> Result<()> {
        self.done = true;
        match self.parent.take() {
            Some(parent) => self.ctx.resume(parent),
            None => Ok(()),
        }
    }
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(parent) = self.parent.take() {
            if let Err(e) = self.ctx.resume(parent) {
                log::error!("Failed to resume suspended transaction: {}", e);
            }
        }
    }
}

/// Builds a [`SessionManager`], applying configurers once.
pub struct SessionManagerBuilder {
    settings: DatabaseSettings,
    driver: Option<Arc<dyn Driver>>,
    configurers: Vec<Box<dyn DatabaseConfigurer>>,
}

impl SessionManagerBuilder {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self {
            settings,
            driver: None,
            configurers: Vec::new(),
        }
    }

    /// Use `driver` instead of resolving one from the settings URL.
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn configurer<C: DatabaseConfigurer + 'static>(mut self, configurer: C) -> Self {
        self.configurers.push(Box::new(configurer));
        self
    }

    pub async fn build(self) -> Result<SessionManager> {
        let engine = match self.driver {
            Some(driver) => {
                self.settings.validate()?;
                EngineHandle::with_driver(self.settings, driver)
            }
            None => EngineHandle::open(self.settings)?,
        };

        let engine = configurer::apply_all(engine, self.configurers).await?;
        Ok(SessionManager::new(engine))
    }
}
