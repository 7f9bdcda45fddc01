use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skillcred_core::{
    CredentialId, CredentialRecord, HolderId, LifecycleConfig, LocalCredentialMirror, MirrorStatus,
};
use skillcred_index::IndexStore;
use skillcred_ledger::LedgerClient;

use crate::error::ResolveError;
use crate::ledger_call::bounded;
use crate::stale::StaleSignal;

/// Where a verification answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Ledger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub record: Option<CredentialRecord>,
    pub source: Source,
    /// Time since the answer was last confirmed by the ledger. Zero for
    /// ledger answers.
    #[serde(rename = "staleness_ms", with = "duration_ms")]
    pub staleness: Duration,
    /// The local mirror disagreed with the ledger; the sweeper was signalled.
    #[serde(default)]
    pub mirror_stale: bool,
}

impl VerificationResult {
    fn from_ledger(record: CredentialRecord, mirror_stale: bool) -> Self {
        Self {
            valid: record.active,
            record: Some(record),
            source: Source::Ledger,
            staleness: Duration::ZERO,
            mirror_stale,
        }
    }

    fn from_cache(row: &LocalCredentialMirror, now: DateTime<Utc>) -> Option<Self> {
        let record = row.cached_record()?;
        let staleness = row
            .age(now)
            .and_then(|age| age.to_std().ok())
            .unwrap_or(Duration::ZERO);
        Some(Self {
            valid: record.active,
            record: Some(record),
            source: Source::Cache,
            staleness,
            mirror_stale: false,
        })
    }
}

/// Answer to a verification query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Credential(VerificationResult),
    Holder {
        holder: HolderId,
        credentials: Vec<VerificationResult>,
    },
}

/// Resolves verification queries against the mirror and the ledger.
///
/// A fresh `mirrored` row is answered from cache. Everything else goes to
/// the ledger, whose answer always wins. A mirrored row of any age is used
/// as a fallback only when the ledger cannot be reached.
pub struct VerificationResolver {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn IndexStore>,
    config: LifecycleConfig,
    stale: Arc<StaleSignal>,
}

impl VerificationResolver {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn IndexStore>,
        config: LifecycleConfig,
        stale: Arc<StaleSignal>,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            stale,
        }
    }

    /// Resolve an identifier, first as a credential id, then as a holder.
    pub async fn resolve(&self, identifier: &str) -> Result<Resolution, ResolveError> {
        let credential_id = CredentialId::parse(identifier)?;

        let credential_err = match self.resolve_credential(&credential_id).await {
            Ok(result) => return Ok(Resolution::Credential(result)),
            Err(e @ (ResolveError::NotFound(_) | ResolveError::VerificationUnavailable(_))) => e,
            Err(e) => return Err(e),
        };

        let holder = HolderId::new(identifier);
        match self.resolve_holder(&holder).await {
            Ok(credentials) if !credentials.is_empty() => Ok(Resolution::Holder {
                holder,
                credentials,
            }),
            Ok(_) => Err(credential_err),
            Err(e) => Err(e),
        }
    }

    /// Verify a single credential.
    pub async fn resolve_credential(
        &self,
        id: &CredentialId,
    ) -> Result<VerificationResult, ResolveError> {
        let now = Utc::now();
        let local = match self.store.mirror_by_ledger_id(id) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(credential_id = %id, error = %e, "index store unavailable, asking ledger");
                None
            }
        };

        if let Some(row) = &local {
            if row.is_fresh(self.config.cache_max_age(), now) {
                if let Some(result) = VerificationResult::from_cache(row, now) {
                    tracing::debug!(credential_id = %id, "verified from cache");
                    return Ok(result);
                }
            }
        }

        match bounded(self.config.ledger_timeout(), self.ledger.get_credential(id)).await {
            Ok(Some(record)) => {
                let mirror_stale = match &local {
                    Some(row) => self.compare(row, &record, now),
                    None => false,
                };
                Ok(VerificationResult::from_ledger(record, mirror_stale))
            }
            Ok(None) => {
                if let Some(row) = &local {
                    tracing::warn!(
                        credential_id = %id,
                        submission_id = %row.submission_id,
                        "ledger has no such credential but it is mirrored locally"
                    );
                    self.stale.flag(row.submission_id.clone());
                }
                Err(ResolveError::NotFound(id.to_string()))
            }
            Err(e) => {
                let cached = local
                    .as_ref()
                    .filter(|row| row.status == MirrorStatus::Mirrored)
                    .and_then(|row| VerificationResult::from_cache(row, now));
                match cached {
                    Some(result) => {
                        tracing::warn!(
                            credential_id = %id,
                            error = %e,
                            staleness_ms = result.staleness.as_millis() as u64,
                            "ledger unreachable, serving cached mirror"
                        );
                        Ok(result)
                    }
                    None => Err(ResolveError::VerificationUnavailable(e.to_string())),
                }
            }
        }
    }

    /// Verify every credential held by a holder.
    ///
    /// Served from cache when every live row for the holder is a fresh
    /// `mirrored` row. A row still pending or unmirrored means the mirror may
    /// be missing a credential, so the ledger's list is used instead.
    pub async fn resolve_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<VerificationResult>, ResolveError> {
        let now = Utc::now();
        let local = self.store.mirrors_for_holder(holder).unwrap_or_else(|e| {
            tracing::warn!(holder = %holder, error = %e, "index store unavailable, asking ledger");
            Vec::new()
        });

        let live: Vec<&LocalCredentialMirror> =
            local.iter().filter(|row| !row.status.is_failed()).collect();
        if !live.is_empty()
            && live
                .iter()
                .all(|row| row.is_fresh(self.config.cache_max_age(), now))
        {
            let cached: Option<Vec<VerificationResult>> = live
                .iter()
                .map(|row| VerificationResult::from_cache(row, now))
                .collect();
            if let Some(cached) = cached {
                tracing::debug!(holder = %holder, count = cached.len(), "holder verified from cache");
                return Ok(cached);
            }
        }

        match bounded(
            self.config.ledger_timeout(),
            self.ledger.credentials_for_holder(holder),
        )
        .await
        {
            Ok(records) => Ok(records
                .into_iter()
                .map(|record| {
                    let row = local
                        .iter()
                        .find(|row| row.ledger_id.as_ref() == Some(&record.id));
                    let mirror_stale = match row {
                        Some(row) => self.compare(row, &record, now),
                        None => false,
                    };
                    VerificationResult::from_ledger(record, mirror_stale)
                })
                .collect()),
            Err(e) => {
                let cached: Vec<VerificationResult> = local
                    .iter()
                    .filter(|row| row.status == MirrorStatus::Mirrored)
                    .filter_map(|row| VerificationResult::from_cache(row, now))
                    .collect();
                if cached.is_empty() {
                    Err(ResolveError::VerificationUnavailable(e.to_string()))
                } else {
                    tracing::warn!(holder = %holder, error = %e, "ledger unreachable, serving cached mirrors");
                    Ok(cached)
                }
            }
        }
    }

    /// Compare a mirror row with the ledger's answer. Returns whether the
    /// row is stale; an agreeing mirrored row is marked reconciled.
    fn compare(&self, row: &LocalCredentialMirror, record: &CredentialRecord, now: DateTime<Utc>) -> bool {
        if row.status != MirrorStatus::Mirrored {
            return false;
        }
        if row.disagrees_with(record) {
            tracing::warn!(
                credential_id = %record.id,
                submission_id = %row.submission_id,
                mirror_active = ?row.active,
                ledger_active = record.active,
                "mirror disagrees with ledger"
            );
            self.stale.flag(row.submission_id.clone());
            return true;
        }
        let touched = self
            .store
            .update_mirror(&row.submission_id, &mut |row: &mut LocalCredentialMirror| {
                row.last_reconciled_at = Some(now);
                Ok(())
            });
        if let Err(e) = touched {
            tracing::debug!(submission_id = %row.submission_id, error = %e, "could not touch mirror");
        }
        false
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
