use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing knobs shared by the orchestrator, resolver, and sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on any single ledger call, in milliseconds.
    pub ledger_timeout_ms: u64,
    /// How long a mirrored row may be served without asking the ledger.
    pub cache_max_age_secs: u64,
    /// Sweeper cadence.
    pub sweep_interval_secs: u64,
    /// Minimum age of an unmirrored or failed row before the sweeper touches it.
    pub grace_period_secs: u64,
    /// Minimum age of a pending row before the sweeper looks it up on the ledger.
    pub pending_timeout_secs: u64,
    /// Mirrored rows older than this are re-checked against the ledger.
    pub revalidate_after_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ledger_timeout_ms: 10_000,
            cache_max_age_secs: 300,
            sweep_interval_secs: 180,
            grace_period_secs: 60,
            pending_timeout_secs: 120,
            revalidate_after_secs: 3_600,
        }
    }
}

impl LifecycleConfig {
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        seconds(self.cache_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn grace_period(&self) -> chrono::Duration {
        seconds(self.grace_period_secs)
    }

    pub fn pending_timeout(&self) -> chrono::Duration {
        seconds(self.pending_timeout_secs)
    }

    pub fn revalidate_after(&self) -> chrono::Duration {
        seconds(self.revalidate_after_secs)
    }

    /// Attempt lease length.
    ///
    /// Covers every bounded call an attempt makes before its write: the key
    /// lookup, the issuer check, and the write itself.
    pub fn lease_length(&self) -> chrono::Duration {
        millis(self.ledger_timeout_ms.saturating_mul(ATTEMPT_LEDGER_CALLS))
    }

    /// Lease extension taken right before the ledger write is dispatched.
    pub fn write_lease_length(&self) -> chrono::Duration {
        millis(self.ledger_timeout_ms)
    }
}

/// Ledger calls an issuance attempt makes while holding its lease.
const ATTEMPT_LEDGER_CALLS: u64 = 3;

// Values come straight from the config file; anything chrono cannot
// represent saturates instead of panicking.
fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn millis(ms: u64) -> chrono::Duration {
    i64::try_from(ms)
        .ok()
        .and_then(chrono::Duration::try_milliseconds)
        .unwrap_or(chrono::Duration::MAX)
}
