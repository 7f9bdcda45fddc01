//! Shared state handed to HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use skillcred_credentials::{IssuanceOrchestrator, ReconciliationSweeper, VerificationResolver};
use skillcred_index::IndexStore;
use skillcred_ledger::MemoryArtifactStore;

pub struct AppState {
    pub orchestrator: IssuanceOrchestrator,
    pub resolver: Arc<VerificationResolver>,
    pub sweeper: Arc<ReconciliationSweeper>,
    pub store: Arc<dyn IndexStore>,
    pub artifacts: Arc<MemoryArtifactStore>,
    /// When the node started.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: IssuanceOrchestrator,
        resolver: Arc<VerificationResolver>,
        sweeper: Arc<ReconciliationSweeper>,
        store: Arc<dyn IndexStore>,
        artifacts: Arc<MemoryArtifactStore>,
    ) -> Self {
        Self {
            orchestrator,
            resolver,
            sweeper,
            store,
            artifacts,
            start_time: Instant::now(),
        }
    }
}
