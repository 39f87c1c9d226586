use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use cinevision_protocol::{CompletedPart, PartStatus, UploadState, UploadTarget};
use tracing::debug;

use crate::TransferError;
use crate::plan::PartPlan;

/// Local bookkeeping for one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    pub status: PartStatus,
    /// Integrity tag returned by storage; set once the part succeeded.
    pub etag: Option<String>,
    /// Number of transfer attempts made so far.
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PartRecord {
    fn pending() -> Self {
        Self {
            status: PartStatus::Pending,
            etag: None,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Tracks one multipart upload session (thread-safe).
///
/// Shared between upload workers through an `Arc`; every mutation goes
/// through the inner lock so the part-tag map stays consistent.
pub struct UploadSession {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    id: String,
    storage_key: String,
    target: UploadTarget,
    plan: PartPlan,
    state: UploadState,
    parts: BTreeMap<u32, PartRecord>,
    /// Presigned upload targets by part number.
    part_targets: HashMap<u32, String>,
    started_at: Instant,
    object_url: Option<String>,
}

fn allowed(from: UploadState, to: UploadState) -> bool {
    use UploadState::*;
    matches!(
        (from, to),
        (Initiated, Uploading)
            | (Uploading, Uploading)
            | (Initiated, Completing)
            | (Uploading, Completing)
            | (Completing, Uploading)
            | (Completing, Completed)
            | (Initiated, Aborted)
            | (Uploading, Aborted)
    )
}

impl SessionInner {
    fn transition(&mut self, to: UploadState) -> Result<(), TransferError> {
        if !allowed(self.state, to) {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(upload_id = %self.id, from = ?self.state, to = ?to, "session transition");
        self.state = to;
        Ok(())
    }

    fn missing(&self) -> Vec<u32> {
        self.parts
            .iter()
            .filter(|(_, p)| p.status != PartStatus::Succeeded)
            .map(|(n, _)| *n)
            .collect()
    }
}

impl UploadSession {
    /// Creates a freshly initiated session with every part pending.
    pub fn new(id: String, storage_key: String, target: UploadTarget, plan: PartPlan) -> Self {
        let now = Instant::now();
        let parts = (1..=plan.total_parts())
            .map(|n| (n, PartRecord::pending()))
            .collect();
        Self {
            inner: RwLock::new(SessionInner {
                id,
                storage_key,
                target,
                plan,
                state: UploadState::Initiated,
                parts,
                part_targets: HashMap::new(),
                started_at: now,
                object_url: None,
            }),
        }
    }

    /// Re-attaches to a session started by an earlier run.
    ///
    /// `confirmed` lists parts storage already accepted; they are not
    /// uploaded again.
    pub fn reattach(
        id: String,
        storage_key: String,
        target: UploadTarget,
        plan: PartPlan,
        confirmed: &[CompletedPart],
    ) -> Result<Self, TransferError> {
        let session = Self::new(id, storage_key, target, plan);
        {
            let mut s = session.write();
            for part in confirmed {
                if part.etag.is_empty() {
                    return Err(TransferError::InvalidInput(format!(
                        "confirmed part {} has an empty tag",
                        part.part_number
                    )));
                }
                let record =
                    s.parts
                        .get_mut(&part.part_number)
                        .ok_or(TransferError::PartOutOfRange {
                            part_number: part.part_number,
                            total_parts: plan.total_parts(),
                        })?;
                record.status = PartStatus::Succeeded;
                record.etag = Some(part.etag.clone());
            }
            if !confirmed.is_empty() {
                s.transition(UploadState::Uploading)?;
            }
        }
        Ok(session)
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Part targets
    // -----------------------------------------------------------------------

    /// Stores one presigned target per part, in part order.
    pub fn set_part_targets(&self, urls: Vec<String>) -> Result<(), TransferError> {
        let mut s = self.write();
        let total = s.plan.total_parts();
        if urls.len() != total as usize {
            return Err(TransferError::InvalidInput(format!(
                "got {} upload targets for {total} parts",
                urls.len()
            )));
        }
        s.part_targets = (1..=total).zip(urls).collect();
        Ok(())
    }

    pub fn set_part_target(&self, part_number: u32, url: String) {
        self.write().part_targets.insert(part_number, url);
    }

    pub fn part_target(&self, part_number: u32) -> Option<String> {
        self.read().part_targets.get(&part_number).cloned()
    }

    /// Forgets a target so the next attempt asks the control plane again.
    pub fn evict_part_target(&self, part_number: u32) {
        self.write().part_targets.remove(&part_number);
    }

    // -----------------------------------------------------------------------
    // Part results
    // -----------------------------------------------------------------------

    /// Counts a transfer attempt for `part_number`.
    pub fn record_attempt(&self, part_number: u32) -> Result<u32, TransferError> {
        let mut s = self.write();
        let total = s.plan.total_parts();
        let record = s
            .parts
            .get_mut(&part_number)
            .ok_or(TransferError::PartOutOfRange {
                part_number,
                total_parts: total,
            })?;
        record.attempts += 1;
        let attempts = record.attempts;
        Ok(attempts)
    }

    /// Records the tag storage returned for `part_number`.
    ///
    /// Returns `Ok(false)` when the same tag was already recorded.
    pub fn record_success(&self, part_number: u32, etag: &str) -> Result<bool, TransferError> {
        let mut s = self.write();
        let total = s.plan.total_parts();
        let record = s
            .parts
            .get_mut(&part_number)
            .ok_or(TransferError::PartOutOfRange {
                part_number,
                total_parts: total,
            })?;

        if record.status == PartStatus::Succeeded {
            return if record.etag.as_deref() == Some(etag) {
                Ok(false)
            } else {
                Err(TransferError::PartAlreadyRecorded { part_number })
            };
        }

        record.status = PartStatus::Succeeded;
        record.etag = Some(etag.to_string());
        record.last_error = None;
        Ok(true)
    }

    /// Marks a part as failed. Succeeded parts are left untouched.
    pub fn record_failure(&self, part_number: u32, error: &str) {
        let mut s = self.write();
        if let Some(record) = s.parts.get_mut(&part_number)
            && record.status != PartStatus::Succeeded
        {
            record.status = PartStatus::Failed;
            record.last_error = Some(error.to_string());
        }
    }

    pub fn part(&self, part_number: u32) -> Option<PartRecord> {
        self.read().parts.get(&part_number).cloned()
    }

    /// Part numbers that still need uploading, ascending.
    pub fn pending_parts(&self) -> Vec<u32> {
        self.read().missing()
    }

    /// Accepted parts with their tags, ascending by part number.
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.read()
            .parts
            .iter()
            .filter_map(|(n, p)| p.etag.as_ref().map(|e| CompletedPart::new(*n, e.clone())))
            .collect()
    }

    pub fn parts_completed(&self) -> u32 {
        let s = self.read();
        s.parts
            .values()
            .filter(|p| p.status == PartStatus::Succeeded)
            .count() as u32
    }

    /// Bytes of all accepted parts.
    pub fn bytes_transferred(&self) -> u64 {
        let s = self.read();
        s.parts
            .iter()
            .filter(|(_, p)| p.status == PartStatus::Succeeded)
            .filter_map(|(n, _)| s.plan.range(*n))
            .map(|r| r.len)
            .sum()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Enters `Uploading`. Idempotent while uploading.
    pub fn begin_uploading(&self) -> Result<(), TransferError> {
        self.write().transition(UploadState::Uploading)
    }

    /// Enters `Completing` once every part has a tag.
    pub fn begin_completing(&self) -> Result<(), TransferError> {
        let mut s = self.write();
        if !allowed(s.state, UploadState::Completing) {
            return Err(TransferError::InvalidTransition {
                from: s.state,
                to: UploadState::Completing,
            });
        }
        let missing = s.missing();
        if !missing.is_empty() {
            return Err(TransferError::Incomplete { missing });
        }
        s.transition(UploadState::Completing)
    }

    /// Returns to `Uploading` after the backend rejected finalization.
    pub fn finalization_failed(&self, error: &str) -> Result<(), TransferError> {
        let mut s = self.write();
        debug!(upload_id = %s.id, error, "finalization rejected");
        s.transition(UploadState::Uploading)
    }

    pub fn mark_completed(&self, object_url: String) -> Result<(), TransferError> {
        let mut s = self.write();
        s.transition(UploadState::Completed)?;
        s.object_url = Some(object_url);
        Ok(())
    }

    /// Moves to `Aborted`. Returns `Ok(false)` if it already was.
    pub fn mark_aborted(&self, reason: &str) -> Result<bool, TransferError> {
        let mut s = self.write();
        if s.state == UploadState::Aborted {
            return Ok(false);
        }
        debug!(upload_id = %s.id, reason, "aborting session");
        s.transition(UploadState::Aborted)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> String {
        self.read().id.clone()
    }

    pub fn storage_key(&self) -> String {
        self.read().storage_key.clone()
    }

    pub fn target(&self) -> UploadTarget {
        self.read().target.clone()
    }

    pub fn plan(&self) -> PartPlan {
        self.read().plan
    }

    pub fn state(&self) -> UploadState {
        self.read().state
    }

    /// Returns `true` until the session is completed or aborted.
    pub fn is_active(&self) -> bool {
        !self.read().state.is_terminal()
    }

    pub fn object_url(&self) -> Option<String> {
        self.read().object_url.clone()
    }

    /// Time since the session was created (or re-attached).
    pub fn elapsed(&self) -> Duration {
        self.read().started_at.elapsed()
    }
}
