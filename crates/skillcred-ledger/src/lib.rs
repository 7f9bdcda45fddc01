//! Skillcred Ledger — the authoritative credential ledger as seen from the
//! issuer's side, plus the best-effort artifact reference store.

pub mod adapters;
pub mod artifact;
pub mod error;
pub mod traits;
pub mod types;

pub use adapters::http::HttpLedgerClient;
pub use adapters::memory::MemoryLedger;
pub use artifact::{content_hash, MemoryArtifactStore};
pub use error::{ArtifactError, LedgerError};
pub use traits::{ArtifactStore, LedgerClient};
pub use types::{IssueMetadata, IssueReceipt, IssueRequest};
