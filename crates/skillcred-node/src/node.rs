//! The Skillcred node.
//!
//! Opens the index store, connects the ledger client, wires the lifecycle
//! services together, and runs the sweeper and the HTTP API as background
//! tasks.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use skillcred_core::IssuerId;
use skillcred_credentials::{
    IssuanceOrchestrator, ReconciliationSweeper, StaleSignal, VerificationResolver,
};
use skillcred_index::{IndexStore, MemoryIndexStore, RocksIndexStore};
use skillcred_ledger::{HttpLedgerClient, LedgerClient, MemoryArtifactStore, MemoryLedger};

use crate::config::{LedgerBackend, SkillcredConfig, StorageBackend};
use crate::state::AppState;

pub struct SkillcredNode {
    config: SkillcredConfig,
    state: Option<Arc<AppState>>,
    shutdown_tx: watch::Sender<bool>,
    sweeper_task: Option<JoinHandle<()>>,
    api_task: Option<JoinHandle<Result<()>>>,
}

impl SkillcredNode {
    pub fn new(config: SkillcredConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            state: None,
            shutdown_tx,
            sweeper_task: None,
            api_task: None,
        }
    }

    /// Open storage, connect the ledger, and start the sweeper and HTTP API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting Skillcred node");
        if let Some(warning) = self.config.backend_warning() {
            tracing::warn!("{}", warning);
        }

        let store = open_store(&self.config)?;
        let ledger = connect_ledger(&self.config)?;
        let state = Arc::new(build_state(&self.config, ledger, store));

        let sweeper = state.sweeper.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.sweeper_task = Some(tokio::spawn(async move { sweeper.run(shutdown_rx).await }));

        let api_addr: SocketAddr = self
            .config
            .api_addr()
            .parse()
            .with_context(|| format!("invalid API address {}", self.config.api_addr()))?;
        let api_state = state.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.api_task = Some(tokio::spawn(async move {
            crate::api::start_api_server(api_addr, api_state, shutdown_rx).await
        }));

        self.state = Some(state);
        Ok(())
    }

    /// Wait for the HTTP API server to exit.
    pub async fn run(&mut self) -> Result<()> {
        let api_task = self
            .api_task
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        api_task.await?
    }

    /// Stop background tasks and close storage.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down Skillcred node");
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.sweeper_task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                tracing::warn!("sweeper did not stop within 5s");
            }
        }
        if let Some(task) = self.api_task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                tracing::warn!("HTTP API did not stop within 5s");
            }
        }

        if self.state.take().is_some() {
            tracing::info!("storage closed");
        }
        tracing::info!("Skillcred node shut down");
        Ok(())
    }
}

fn open_store(config: &SkillcredConfig) -> Result<Arc<dyn IndexStore>> {
    match config.storage.backend {
        StorageBackend::Rocksdb => {
            let path = config.storage.data_dir.join("index");
            let store = RocksIndexStore::open(&path)
                .with_context(|| format!("opening index store at {}", path.display()))?;
            tracing::info!(path = %path.display(), "index store opened");
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory index store; mirror is lost on restart");
            Ok(Arc::new(MemoryIndexStore::new()))
        }
    }
}

fn connect_ledger(config: &SkillcredConfig) -> Result<Arc<dyn LedgerClient>> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            let issuers = config
                .ledger
                .authorized_issuers
                .iter()
                .map(|s| IssuerId::new(s.as_str()));
            tracing::warn!("using in-memory ledger; credentials are lost on restart");
            Ok(Arc::new(MemoryLedger::with_issuers(issuers)))
        }
        LedgerBackend::Http => {
            let endpoint = config
                .ledger
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("ledger.endpoint is required for the http backend"))?;
            let client = HttpLedgerClient::new(endpoint, config.lifecycle.ledger_timeout())?;
            tracing::info!(%endpoint, "ledger gateway configured");
            Ok(Arc::new(client))
        }
    }
}

/// Wire the lifecycle services around a ledger and a store.
pub fn build_state(
    config: &SkillcredConfig,
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn IndexStore>,
) -> AppState {
    let lifecycle = config.lifecycle.clone();
    let stale = Arc::new(StaleSignal::new());
    let artifacts = Arc::new(MemoryArtifactStore::new());

    let orchestrator = IssuanceOrchestrator::new(
        IssuerId::new(config.ledger.issuer.as_str()),
        ledger.clone(),
        store.clone(),
        lifecycle.clone(),
    )
    .with_artifact_store(artifacts.clone());
    let resolver = Arc::new(VerificationResolver::new(
        ledger.clone(),
        store.clone(),
        lifecycle.clone(),
        stale.clone(),
    ));
    let sweeper = Arc::new(ReconciliationSweeper::new(
        ledger.clone(),
        store.clone(),
        lifecycle,
        stale,
    ));

    tracing::info!(
        issuer = %config.ledger.issuer,
        ledger = ledger.backend_id(),
        "lifecycle services ready"
    );
    AppState::new(orchestrator, resolver, sweeper, store, artifacts)
}
