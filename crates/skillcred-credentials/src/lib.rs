//! Skillcred Credentials — drives approved submissions onto the ledger,
//! answers verification queries, and repairs ledger/mirror divergence.

mod ledger_call;
mod mirror_writer;

pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod stale;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use error::{IssueError, MirrorWriteFailed, ResolveError, RevokeError};
pub use orchestrator::{IssuanceOrchestrator, IssueOutcome};
pub use resolver::{Resolution, Source, VerificationResolver, VerificationResult};
pub use stale::StaleSignal;
pub use sweeper::{ReconciliationSweeper, SweepReport};
