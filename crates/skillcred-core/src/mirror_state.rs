use std::fmt;

use crate::error::CoreError;

/// Reconciliation status of a local mirror row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStatus {
    /// Row claimed; the ledger write has not been confirmed.
    PendingLedgerWrite,
    /// The ledger confirmed the credential; the local copy is missing.
    LedgerConfirmedUnmirrored,
    /// Ledger record copied locally.
    Mirrored,
    /// The ledger definitively rejected the write.
    MirrorFailed,
    /// Local row claims a credential the ledger says does not exist.
    Orphaned,
}

impl MirrorStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [MirrorStatus; 5] = [
        Self::PendingLedgerWrite,
        Self::LedgerConfirmedUnmirrored,
        Self::Mirrored,
        Self::MirrorFailed,
        Self::Orphaned,
    ];

    /// Whether this row blocks a fresh issuance attempt.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::MirrorFailed | Self::Orphaned)
    }

    /// Whether the ledger is known to hold the credential.
    pub fn is_ledger_confirmed(&self) -> bool {
        matches!(self, Self::LedgerConfirmedUnmirrored | Self::Mirrored)
    }

    /// Stable snake_case name, as stored and reported over the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingLedgerWrite => "pending_ledger_write",
            Self::LedgerConfirmedUnmirrored => "ledger_confirmed_unmirrored",
            Self::Mirrored => "mirrored",
            Self::MirrorFailed => "mirror_failed",
            Self::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move a mirror row between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorEvent {
    /// The ledger returned (or was found to hold) the credential.
    LedgerConfirmed,
    /// The ledger definitively refused the write.
    LedgerRejected,
    /// The local copy of the ledger record was written.
    MirrorWritten,
    /// The ledger definitively reported the credential absent.
    LedgerAbsent,
    /// An operator re-submitted a failed issuance.
    Retry,
}

/// Validates mirror status transitions.
///
/// Valid transitions:
/// - PendingLedgerWrite → LedgerConfirmedUnmirrored (LedgerConfirmed)
/// - PendingLedgerWrite → MirrorFailed (LedgerRejected)
/// - LedgerConfirmedUnmirrored → Mirrored (MirrorWritten)
/// - Mirrored → Mirrored (MirrorWritten)
/// - MirrorFailed → LedgerConfirmedUnmirrored (LedgerConfirmed)
/// - MirrorFailed → PendingLedgerWrite (Retry)
/// - Orphaned → PendingLedgerWrite (Retry)
/// - LedgerConfirmedUnmirrored → Orphaned (LedgerAbsent)
/// - Mirrored → Orphaned (LedgerAbsent)
pub struct MirrorStateMachine;

impl MirrorStateMachine {
    /// Attempt a transition. Returns the new status or an error.
    pub fn transition(current: MirrorStatus, event: MirrorEvent) -> Result<MirrorStatus, CoreError> {
        use MirrorEvent as E;
        use MirrorStatus as S;

        let next = match (current, event) {
            (S::PendingLedgerWrite, E::LedgerConfirmed) => S::LedgerConfirmedUnmirrored,
            (S::PendingLedgerWrite, E::LedgerRejected) => S::MirrorFailed,

            (S::LedgerConfirmedUnmirrored, E::MirrorWritten) => S::Mirrored,
            (S::LedgerConfirmedUnmirrored, E::LedgerAbsent) => S::Orphaned,

            (S::Mirrored, E::MirrorWritten) => S::Mirrored,
            (S::Mirrored, E::LedgerAbsent) => S::Orphaned,

            (S::MirrorFailed, E::LedgerConfirmed) => S::LedgerConfirmedUnmirrored,
            (S::MirrorFailed, E::Retry) => S::PendingLedgerWrite,

            (S::Orphaned, E::Retry) => S::PendingLedgerWrite,

            _ => {
                return Err(CoreError::InvalidMirrorTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %next,
            event = ?event,
            "mirror state transition"
        );

        Ok(next)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: MirrorStatus, event: MirrorEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
