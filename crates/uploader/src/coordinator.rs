use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use cinevision_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, CompletedPart, InitiateMultipartRequest,
    PresignedUrlRequest, UploadState, UploadTarget,
};
use cinevision_transfer::{
    PartPlan, TransferError, UploadSession, effective_chunk_size, validate_content_type,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::control_plane::ControlPlane;
use crate::error::{TransportError, UploadError};
use crate::retry::{RetryPolicy, backoff};
use crate::storage::PartStore;
use crate::types::{CompletionResult, PartResult, ResumeState};

/// Drives one multipart session against the control plane and storage.
///
/// Cheap to clone; clones share the transports and the cancellation token.
#[derive(Clone)]
pub struct ChunkedUploadCoordinator {
    control: Arc<dyn ControlPlane>,
    store: Arc<dyn PartStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ChunkedUploadCoordinator {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        store: Arc<dyn PartStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            control,
            store,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token observed by part uploads.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Initiate
    // -----------------------------------------------------------------------

    /// Opens a session for a file of `file_size` bytes.
    ///
    /// `chunk_size` is raised when needed to stay within the part limit.
    pub async fn initiate(
        &self,
        target: &UploadTarget,
        file_name: &str,
        file_size: u64,
        content_type: &str,
        chunk_size: u64,
    ) -> Result<Arc<UploadSession>, UploadError> {
        if file_size == 0 {
            return Err(UploadError::InvalidInput("file is empty".into()));
        }
        if target.content_language_id.trim().is_empty() {
            return Err(UploadError::InvalidInput(
                "content language id is empty".into(),
            ));
        }
        validate_content_type(content_type)?;
        self.check_cancelled()?;

        let chunk_size = effective_chunk_size(file_size, chunk_size);
        let plan = PartPlan::new(file_size, chunk_size)?;

        let resp = self
            .control
            .initiate(InitiateMultipartRequest {
                content_language_id: target.content_language_id.clone(),
                file_name: file_name.to_string(),
                file_size,
                content_type: content_type.to_string(),
                chunk_size: Some(chunk_size),
            })
            .await
            .map_err(|source| UploadError::Initiation { source })?;

        if resp.upload_id.is_empty() {
            return Err(UploadError::Initiation {
                source: TransportError::Decode("control plane returned an empty upload id".into()),
            });
        }
        if let Some(total) = resp.total_parts
            && total != plan.total_parts()
        {
            return Err(UploadError::Initiation {
                source: TransportError::Decode(format!(
                    "control plane planned {total} parts, expected {}",
                    plan.total_parts()
                )),
            });
        }

        let storage_key = resp.object_key().unwrap_or_default().to_string();
        let session = UploadSession::new(
            resp.upload_id.clone(),
            storage_key,
            target.clone(),
            plan,
        );

        let urls = resp.presigned_urls;
        if urls.len() == plan.total_parts() as usize {
            session.set_part_targets(urls)?;
        } else if !urls.is_empty() {
            warn!(
                upload_id = %resp.upload_id,
                urls = urls.len(),
                parts = plan.total_parts(),
                "presigned URL count does not match part count, signing per part"
            );
        }

        info!(
            upload_id = %resp.upload_id,
            file_name,
            file_size,
            chunk_size,
            parts = plan.total_parts(),
            "multipart upload initiated"
        );
        Ok(Arc::new(session))
    }

    /// Rebuilds a session from a [`ResumeState`] without contacting the
    /// control plane.
    pub fn reattach(&self, resume: &ResumeState) -> Result<Arc<UploadSession>, UploadError> {
        let plan = PartPlan::new(resume.file_size, resume.chunk_size)?;
        let session = UploadSession::reattach(
            resume.upload_id.clone(),
            resume.storage_key.clone(),
            resume.target.clone(),
            plan,
            &resume.confirmed_parts,
        )?;
        info!(
            upload_id = %resume.upload_id,
            confirmed = resume.confirmed_parts.len(),
            parts = plan.total_parts(),
            "resuming multipart upload"
        );
        Ok(Arc::new(session))
    }

    // -----------------------------------------------------------------------
    // Parts
    // -----------------------------------------------------------------------

    /// Stores part `part_number` and records its tag on the session.
    ///
    /// Transient failures are retried with backoff up to the policy's
    /// attempt budget. A part that is already stored is not sent again.
    pub async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        chunk: Bytes,
    ) -> Result<PartResult, UploadError> {
        let state = session.state();
        if !matches!(state, UploadState::Initiated | UploadState::Uploading) {
            return Err(UploadError::SessionClosed {
                upload_id: session.id(),
                state,
            });
        }

        let range = session.plan().require_range(part_number)?;
        if chunk.len() as u64 != range.len {
            return Err(TransferError::PartLengthMismatch {
                part_number,
                expected: range.len,
                actual: chunk.len() as u64,
            }
            .into());
        }

        if let Some(record) = session.part(part_number)
            && let Some(etag) = record.etag
        {
            debug!(part_number, "part already stored");
            return Ok(PartResult {
                range,
                etag,
                attempts: 0,
            });
        }

        session.begin_uploading()?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            self.check_cancelled()?;
            attempt += 1;
            session.record_attempt(part_number)?;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                r = self.try_part(session, part_number, chunk.clone()) => r,
            };

            let err = match result {
                Ok(etag) => {
                    session.record_success(part_number, &etag)?;
                    debug!(part_number, attempt, bytes = range.len, "part stored");
                    return Ok(PartResult {
                        range,
                        etag,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            session.record_failure(part_number, &err.to_string());
            if err.is_client_error() {
                session.evict_part_target(part_number);
            }
            if !err.is_transient() || attempt >= max_attempts {
                warn!(part_number, attempt, error = %err, "part upload failed");
                return Err(UploadError::PartUpload {
                    part_number,
                    attempts: attempt,
                    cause: err,
                });
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                part_number,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "part upload failed, retrying"
            );
            if !backoff(delay, &self.cancel).await {
                return Err(UploadError::Cancelled);
            }
        }
    }

    async fn try_part(
        &self,
        session: &UploadSession,
        part_number: u32,
        chunk: Bytes,
    ) -> Result<String, TransportError> {
        let url = match session.part_target(part_number) {
            Some(url) => url,
            None => {
                let url = self
                    .control
                    .presigned_url(PresignedUrlRequest {
                        content_language_id: session.target().content_language_id,
                        upload_id: session.id(),
                        part_number,
                    })
                    .await?;
                session.set_part_target(part_number, url.clone());
                url
            }
        };
        self.store.put_part(url, chunk).await
    }

    // -----------------------------------------------------------------------
    // Complete / abort
    // -----------------------------------------------------------------------

    /// Asks the control plane to assemble the object from `parts`.
    ///
    /// `parts` must cover every planned part exactly once with the tags
    /// storage returned; nothing is sent otherwise.
    pub async fn complete(
        &self,
        session: &UploadSession,
        parts: &[CompletedPart],
    ) -> Result<CompletionResult, UploadError> {
        let state = session.state();
        if state.is_terminal() || state == UploadState::Completing {
            return Err(UploadError::SessionClosed {
                upload_id: session.id(),
                state,
            });
        }

        let parts = self.check_part_set(session, parts)?;
        session.begin_completing().map_err(|e| match e {
            TransferError::Incomplete { missing } => UploadError::IncompleteUpload { missing },
            other => other.into(),
        })?;

        let upload_id = session.id();
        let plan = session.plan();
        let req = CompleteMultipartRequest {
            content_language_id: session.target().content_language_id,
            upload_id: upload_id.clone(),
            parts,
        };

        let resp = match self.control.complete(req).await {
            Ok(resp) if resp.success => resp,
            Ok(resp) => {
                let message = resp
                    .message
                    .unwrap_or_else(|| "finalization reported failure".into());
                session.finalization_failed(&message)?;
                return Err(UploadError::Finalization {
                    status: None,
                    message,
                });
            }
            Err(e) => {
                session.finalization_failed(&e.to_string())?;
                return Err(UploadError::Finalization {
                    status: e.status(),
                    message: e.to_string(),
                });
            }
        };

        let object_url = resp
            .object_url()
            .map(str::to_string)
            .unwrap_or_else(|| session.storage_key());
        session.mark_completed(object_url.clone())?;

        info!(
            upload_id = %upload_id,
            object_url = %object_url,
            parts = plan.total_parts(),
            "multipart upload completed"
        );
        Ok(CompletionResult {
            upload_id,
            storage_key: session.storage_key(),
            object_url,
            file_name: resp.file_name,
            processing_status: resp.data.and_then(|d| d.processing_status),
            total_parts: plan.total_parts(),
            total_bytes: plan.file_size(),
        })
    }

    /// Sorts `parts` and checks them against the session's accepted tags.
    fn check_part_set(
        &self,
        session: &UploadSession,
        parts: &[CompletedPart],
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let total = session.plan().total_parts();
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|p| p.part_number);

        let mut seen = BTreeSet::new();
        for part in &sorted {
            if part.part_number == 0 || part.part_number > total {
                return Err(UploadError::PartSetMismatch(format!(
                    "part {} outside 1..={total}",
                    part.part_number
                )));
            }
            if !seen.insert(part.part_number) {
                return Err(UploadError::PartSetMismatch(format!(
                    "part {} listed twice",
                    part.part_number
                )));
            }
        }

        let missing: Vec<u32> = (1..=total).filter(|n| !seen.contains(n)).collect();
        if !missing.is_empty() {
            return Err(UploadError::IncompleteUpload { missing });
        }

        for part in &sorted {
            let recorded = session.part(part.part_number).and_then(|r| r.etag);
            match recorded {
                Some(etag) if etag == part.etag => {}
                Some(_) => {
                    return Err(UploadError::PartSetMismatch(format!(
                        "part {} tag differs from the one storage returned",
                        part.part_number
                    )));
                }
                None => {
                    return Err(UploadError::IncompleteUpload {
                        missing: session.pending_parts(),
                    });
                }
            }
        }
        Ok(sorted)
    }

    /// Releases the remote session. Best-effort and idempotent.
    pub async fn abort(&self, session: &UploadSession, reason: &str) {
        let upload_id = session.id();
        match session.mark_aborted(reason) {
            Ok(true) => {}
            Ok(false) => {
                debug!(upload_id = %upload_id, "session already aborted");
                return;
            }
            Err(e) => {
                warn!(upload_id = %upload_id, error = %e, "session cannot be aborted");
                return;
            }
        }

        let req = AbortMultipartRequest {
            content_language_id: session.target().content_language_id,
            upload_id: upload_id.clone(),
        };
        match self.control.abort(req).await {
            Ok(()) => info!(upload_id = %upload_id, reason, "multipart upload aborted"),
            Err(e) => warn!(
                upload_id = %upload_id,
                error = %e,
                "failed to abort multipart upload, storage may keep orphaned parts"
            ),
        }
    }
}
