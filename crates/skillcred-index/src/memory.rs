use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use skillcred_core::{
    CoreError, CredentialId, HolderId, LocalCredentialMirror, MirrorStatus, Submission,
    SubmissionId,
};

use crate::error::IndexError;
use crate::traits::{ClaimOutcome, IndexStore};

#[derive(Default)]
struct Tables {
    submissions: HashMap<SubmissionId, Submission>,
    mirrors: HashMap<SubmissionId, LocalCredentialMirror>,
    by_ledger_id: HashMap<CredentialId, SubmissionId>,
}

/// Non-persistent index store, for tests and single-process development.
#[derive(Default)]
pub struct MemoryIndexStore {
    tables: RwLock<Tables>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, IndexError> {
        self.tables
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, IndexError> {
        self.tables
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".into()))
    }
}

impl Tables {
    fn store_mirror(&mut self, mirror: LocalCredentialMirror) {
        if let Some(ledger_id) = &mirror.ledger_id {
            self.by_ledger_id
                .insert(ledger_id.clone(), mirror.submission_id.clone());
        }
        self.mirrors.insert(mirror.submission_id.clone(), mirror);
    }
}

impl IndexStore for MemoryIndexStore {
    fn put_submission(&self, submission: &Submission) -> Result<(), IndexError> {
        self.write()?
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, IndexError> {
        Ok(self.read()?.submissions.get(id).cloned())
    }

    fn claim_mirror(&self, mirror: LocalCredentialMirror) -> Result<ClaimOutcome, IndexError> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.mirrors.get(&mirror.submission_id) {
            return Ok(ClaimOutcome::Existing(existing.clone()));
        }
        tables.store_mirror(mirror.clone());
        Ok(ClaimOutcome::Created(mirror))
    }

    fn get_mirror(&self, id: &SubmissionId) -> Result<Option<LocalCredentialMirror>, IndexError> {
        Ok(self.read()?.mirrors.get(id).cloned())
    }

    fn update_mirror(
        &self,
        id: &SubmissionId,
        apply: &mut dyn FnMut(&mut LocalCredentialMirror) -> Result<(), CoreError>,
    ) -> Result<LocalCredentialMirror, IndexError> {
        let mut tables = self.write()?;
        let mut row = tables
            .mirrors
            .get(id)
            .cloned()
            .ok_or_else(|| IndexError::MirrorNotFound(id.clone()))?;
        apply(&mut row)?;
        tables.store_mirror(row.clone());
        Ok(row)
    }

    fn mirror_by_ledger_id(
        &self,
        id: &CredentialId,
    ) -> Result<Option<LocalCredentialMirror>, IndexError> {
        let tables = self.read()?;
        Ok(tables
            .by_ledger_id
            .get(id)
            .and_then(|sub| tables.mirrors.get(sub))
            .cloned())
    }

    fn mirrors_for_holder(
        &self,
        holder: &HolderId,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        let mut rows: Vec<_> = self
            .read()?
            .mirrors
            .values()
            .filter(|m| &m.holder == holder)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    fn mirrors_with_status(
        &self,
        status: MirrorStatus,
    ) -> Result<Vec<LocalCredentialMirror>, IndexError> {
        let mut rows: Vec<_> = self
            .read()?
            .mirrors
            .values()
            .filter(|m| m.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}
