// ============================================================================
// Propagation State Machine
// ============================================================================
//
// Pure decision table: given a propagation mode and whether the calling task
// already has an active frame, pick the frame transition to perform.
//
// ============================================================================

use super::frame::TransactionFrame;
use crate::core::TxError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a call relates to an already-active transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the active transaction, or start one
    #[default]
    Required,
    /// Always start an independent transaction, suspending any active one
    RequiresNew,
    /// Join if active, otherwise run without a transaction
    Supports,
    /// An active transaction must exist
    Mandatory,
    /// No transaction may be active
    Never,
    /// Run without a transaction, suspending any active one
    NotSupported,
}

impl Propagation {
    pub const ALL: [Propagation; 6] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::Mandatory,
        Propagation::Never,
        Propagation::NotSupported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Supports => "SUPPORTS",
            Propagation::Mandatory => "MANDATORY",
            Propagation::Never => "NEVER",
            Propagation::NotSupported => "NOT_SUPPORTED",
        }
    }

    /// The decision table.
    pub fn action(&self, has_frame: bool) -> Action {
        use Propagation::*;

        match (self, has_frame) {
            (Required, true) => Action::Join,
            (Required, false) => Action::Create,

            (RequiresNew, true) => Action::CreateSuspending { managed: true },
            (RequiresNew, false) => Action::Create,

            (Supports, true) => Action::Join,
            (Supports, false) => Action::RunBare,

            (Mandatory, true) => Action::Join,
            (Mandatory, false) => Action::Fail(FailKind::Mandatory),

            (Never, true) => Action::Fail(FailKind::Never),
            (Never, false) => Action::RunBare,

            (NotSupported, true) => Action::CreateSuspending { managed: false },
            (NotSupported, false) => Action::RunBare,
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    Mandatory,
    Never,
}

impl FailKind {
    pub fn into_error(self) -> TxError {
        match self {
            FailKind::Mandatory => TxError::Mandatory,
            FailKind::Never => TxError::Never,
        }
    }
}

/// Frame transition chosen for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reuse the active frame's session; never finalize
    Join,
    /// Open a session, begin, push an owning frame
    Create,
    /// Suspend the active frame first, then create.
    ///
    /// With `managed: false` the new session runs without a transaction
    /// (NOT_SUPPORTED): no frame is pushed and the parent stays suspended
    /// until the call returns.
    CreateSuspending { managed: bool },
    /// Open an unmanaged session, push nothing
    RunBare,
    /// Raise without opening anything
    Fail(FailKind),
}

impl Action {
    pub fn opens_session(&self) -> bool {
        !matches!(self, Action::Join | Action::Fail(_))
    }

    pub fn suspends(&self) -> bool {
        matches!(self, Action::CreateSuspending { .. })
    }
}

/// Decide the transition for `mode` against the calling task's active frame.
pub fn decide(mode: Propagation, existing: Option<&TransactionFrame>) -> Action {
    mode.action(existing.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table_is_exhaustive() {
        let expected = [
            (Propagation::Required, true, Action::Join),
            (Propagation::Required, false, Action::Create),
            (
                Propagation::RequiresNew,
                true,
                Action::CreateSuspending { managed: true },
            ),
            (Propagation::RequiresNew, false, Action::Create),
            (Propagation::Supports, true, Action::Join),
            (Propagation::Supports, false, Action::RunBare),
            (Propagation::Mandatory, true, Action::Join),
            (
                Propagation::Mandatory,
                false,
                Action::Fail(FailKind::Mandatory),
            ),
            (Propagation::Never, true, Action::Fail(FailKind::Never)),
            (Propagation::Never, false, Action::RunBare),
            (
                Propagation::NotSupported,
                true,
                Action::CreateSuspending { managed: false },
            ),
            (Propagation::NotSupported, false, Action::RunBare),
        ];

        assert_eq!(expected.len(), Propagation::ALL.len() * 2);
        for (mode, has_frame, action) in expected {
            assert_eq!(
                mode.action(has_frame),
                action,
                "{} with frame={}",
                mode,
                has_frame
            );
        }
    }

    #[test]
    fn test_decide_without_frame() {
        for mode in Propagation::ALL {
            assert_eq!(decide(mode, None), mode.action(false));
        }
    }

    #[test]
    fn test_failures_open_nothing() {
        assert!(!Action::Fail(FailKind::Never).opens_session());
        assert!(!Action::Join.opens_session());
        assert!(Action::RunBare.opens_session());
        assert!(matches!(FailKind::Mandatory.into_error(), TxError::Mandatory));
    }

    #[test]
    fn test_serde_names() {
        let mode: Propagation = serde_json::from_str("\"REQUIRES_NEW\"").unwrap();
        assert_eq!(mode, Propagation::RequiresNew);
    }
}
