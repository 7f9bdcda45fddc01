//! Skillcred Index — the local, best-effort mirror of ledger credentials
//! plus the submission metadata the ledger does not hold.

pub mod error;
pub mod memory;
pub mod rocks;
pub mod traits;

pub use error::IndexError;
pub use memory::MemoryIndexStore;
pub use rocks::RocksIndexStore;
pub use traits::{ClaimOutcome, IndexStore};
