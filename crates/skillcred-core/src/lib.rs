//! Skillcred Core — identifiers, records, and the mirror state machine
//! shared by the ledger, index, and credential lifecycle crates.

pub mod config;
pub mod error;
pub mod mirror_state;
pub mod records;
pub mod types;

pub use config::LifecycleConfig;
pub use error::CoreError;
pub use mirror_state::{MirrorEvent, MirrorStateMachine, MirrorStatus};
pub use records::{
    ApprovedSubmission, CredentialRecord, IssuanceState, IssuanceView, LocalCredentialMirror,
    ReviewStatus, Submission,
};
pub use types::{CredentialId, HolderId, IdempotencyKey, IssuerId, SubmissionId, TxRef};
