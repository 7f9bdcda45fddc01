//! RocksDB backend for the local index store.

use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;

use skillcred_core::{
    CoreError, CredentialId, HolderId, LocalCredentialMirror, MirrorStatus, Submission,
    SubmissionId,
};

use crate::error::IndexError;
use crate::traits::{ClaimOutcome, IndexStore};

/// Column family names for different data types.
const CF_SUBMISSIONS: &str = "submissions";
const CF_MIRRORS: &str = "mirrors";
const CF_LEDGER_INDEX: &str = "ledger_index";
const CF_HOLDER_INDEX: &str = "holder_index";

const ALL_CFS: [&str; 4] = [CF_SUBMISSIONS, CF_MIRRORS, CF_LEDGER_INDEX, CF_HOLDER_INDEX];

/// RocksDB-backed index store.
///
/// Mirror rows are JSON keyed by submission id. Secondary indexes map ledger
/// credential ids and `holder\0submission` keys back to the row and are
/// written in the same batch as the row itself.
pub struct RocksIndexStore {
    db: DB,
    /// Serializes claim and read-modify-write on mirror rows.
    write_lock: Mutex<()>,
}

impl RocksIndexStore {
    /// Open or create the database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(path).map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::debug!(path = %path.display(), "index store opened");

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, IndexError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| IndexError::Unavailable(format!("column family '{}' not found", name)))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, IndexError> {
        match self.db.get_cf(self.cf(cf_name)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn holder_key(holder: &HolderId, submission: &SubmissionId) -> Vec<u8> {
        let mut key = holder_prefix(holder);
        key.extend_from_slice(submission.as_str().as_bytes());
        key
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, IndexError> {
        self.write_lock
            .lock()
            .map_err(|_| IndexError::Unavailable("index write lock poisoned".into()))
    }

    /// Write a row and its index entries atomically, dropping stale index keys.
    fn write_mirror(
        &self,
        previous: Option<&LocalCredentialMirror>,
        row: &LocalCredentialMirror,
    ) -> Result<(), IndexError> {
        let mirrors = self.cf(CF_MIRRORS)?;
        let ledger_index = self.cf(CF_LEDGER_INDEX)?;
        let holder_index = self.cf(CF_HOLDER_INDEX)?;
        let sub_key = row.submission_id.as_str().as_bytes();

        let mut batch = WriteBatch::default();
        if let Some(prev) = previous {
            if prev.holder != row.holder {
                batch.delete_cf(holder_index, Self::holder_key(&prev.holder, &prev.submission_id));
            }
            if let Some(old_id) = &prev.ledger_id {
                if row.ledger_id.as_ref() != Some(old_id) {
                    batch.delete_cf(ledger_index, old_id.as_str().as_bytes());
                }
            }
        }
        batch.put_cf(mirrors, sub_key, serde_json::to_vec(row)?);
        batch.put_cf(holder_index, Self::holder_key(&row.holder, &row.submission_id), b"");
        if let Some(ledger_id) = &row.ledger_id {
            batch.put_cf(ledger_index, ledger_id.as_str().as_bytes(), sub_key);
        }
        self.db.write(batch)?;
        Ok(())
    }

    fn scan_mirrors(
        &self,
        mut keep: impl FnMut(&LocalCredentialMirror) -> bool,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_MIRRORS)?, IteratorMode::Start) {
            let (_, value) = item?;
            let row: LocalCredentialMirror = serde_json::from_slice(&value)?;
            if keep(&row) {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

fn holder_prefix(holder: &HolderId) -> Vec<u8> {
    let mut key = holder.as_str().as_bytes().to_vec();
    key.push(0);
    key
}

impl IndexStore for RocksIndexStore {
    fn put_submission(&self, submission: &Submission) -> Result<(), IndexError> {
        self.db.put_cf(
            self.cf(CF_SUBMISSIONS)?,
            submission.id.as_str().as_bytes(),
            serde_json::to_vec(submission)?,
        )?;
        Ok(())
    }

    fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, IndexError> {
        self.get_json(CF_SUBMISSIONS, id.as_str().as_bytes())
    }

    fn claim_mirror(&self, mirror: LocalCredentialMirror) -> Result<ClaimOutcome, IndexError> {
        let _guard = self.lock()?;
        if let Some(existing) = self.get_mirror(&mirror.submission_id)? {
            return Ok(ClaimOutcome::Existing(existing));
        }
        self.write_mirror(None, &mirror)?;
        Ok(ClaimOutcome::Created(mirror))
    }

    fn get_mirror(&self, id: &SubmissionId) -> Result<Option<LocalCredentialMirror>, IndexError> {
        self.get_json(CF_MIRRORS, id.as_str().as_bytes())
    }

    fn update_mirror(
        &self,
        id: &SubmissionId,
        apply: &mut dyn FnMut(&mut LocalCredentialMirror) -> Result<(), CoreError>,
    ) -> Result<LocalCredentialMirror, IndexError> {
        let _guard = self.lock()?;
        let previous = self
            .get_mirror(id)?
            .ok_or_else(|| IndexError::MirrorNotFound(id.clone()))?;
        let mut row = previous.clone();
        apply(&mut row)?;
        self.write_mirror(Some(&previous), &row)?;
        Ok(row)
    }

    fn mirror_by_ledger_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<LocalCredentialMirror>, IndexError> {
        let Some(sub_key) = self.db.get_cf(self.cf(CF_LEDGER_INDEX)?, id.as_str().as_bytes())? else {
            return Ok(None);
        };
        self.get_json(CF_MIRRORS, &sub_key)
    }

    fn mirrors_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        let prefix = holder_prefix(holder);
        let mut rows = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(CF_HOLDER_INDEX)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(row) = self.get_json::<LocalCredentialMirror>(CF_MIRRORS, &key[prefix.len()..])? {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    fn mirrors_with_status(
        &self,
        status: MirrorStatus,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        self.scan_mirrors(|row| row.status == status)
    }

    fn status_counts(&self) -> Result<Vec<(MirrorStatus, usize)>, IndexError> {
        let rows = self.scan_mirrors(|_| true)?;
        Ok(MirrorStatus::ALL
            .iter()
            .map(|s| (*s, rows.iter().filter(|r| r.status == *s).count()))
            .collect())
    }
}
