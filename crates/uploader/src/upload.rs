use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use cinevision_protocol::UploadTarget;
use cinevision_transfer::{PartReader, ProgressReporter, UploadSession, upload_file_name};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::content_type::content_type_for_path;
use crate::control_plane::ControlPlane;
use crate::coordinator::ChunkedUploadCoordinator;
use crate::error::UploadError;
use crate::retry::RetryPolicy;
use crate::storage::PartStore;
use crate::types::{CompletionResult, ResumeState, UploadOptions};

/// Uploads whole files through [`ChunkedUploadCoordinator`].
pub struct Uploader {
    control: Arc<dyn ControlPlane>,
    store: Arc<dyn PartStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(control: Arc<dyn ControlPlane>, store: Arc<dyn PartStore>) -> Self {
        Self {
            control,
            store,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides backoff timing; the attempt budget still comes from
    /// [`UploadOptions::max_retries_per_part`].
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Token that cancels every upload started by this uploader.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `file_path` to `target` and returns the finalized object.
    ///
    /// On cancellation or deadline expiry the remote session is aborted.
    /// The deadline covers the part uploads, not finalization.
    /// Other failures abort it too unless `abort_on_failure` is off, in
    /// which case the error is [`UploadError::Interrupted`] with the state
    /// needed to resume.
    pub async fn upload(
        &self,
        file_path: &Path,
        target: &UploadTarget,
        options: UploadOptions,
    ) -> Result<CompletionResult, UploadError> {
        options.validate()?;
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let path = file_path.to_path_buf();
        let reader = tokio::task::spawn_blocking(move || PartReader::open(&path))
            .await
            .map_err(|e| UploadError::Join(e.to_string()))??;
        let file_name = upload_file_name(file_path)?;
        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_path(file_path).to_string());

        let coordinator = ChunkedUploadCoordinator::new(
            self.control.clone(),
            self.store.clone(),
            self.retry
                .clone()
                .with_max_attempts(options.max_retries_per_part),
        )
        .with_cancel(self.cancel.child_token());

        let session = match &options.resume {
            Some(resume) => {
                check_resume(resume, target, reader.file_size())?;
                coordinator.reattach(resume)?
            }
            None => {
                coordinator
                    .initiate(
                        target,
                        &file_name,
                        reader.file_size(),
                        &content_type,
                        options.chunk_size,
                    )
                    .await?
            }
        };

        let parts = self.upload_parts(&coordinator, &session, reader, &options);
        let result = match options.session_deadline {
            Some(deadline) => match tokio::time::timeout(deadline, parts).await {
                Ok(result) => result,
                Err(_) => {
                    // Stop in-flight workers before releasing the session.
                    coordinator.cancel_token().cancel();
                    Err(UploadError::DeadlineExceeded(deadline))
                }
            },
            None => parts.await,
        };

        // The deadline bounds the part phase only; finalization runs to completion.
        let result = match result {
            Ok(()) => {
                coordinator
                    .complete(&session, &session.completed_parts())
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(done) => Ok(done),
            Err(e) => Err(self.fail(&coordinator, &session, &options, e).await),
        }
    }

    async fn upload_parts(
        &self,
        coordinator: &ChunkedUploadCoordinator,
        session: &Arc<UploadSession>,
        reader: PartReader,
        options: &UploadOptions,
    ) -> Result<(), UploadError> {
        let reporter = Arc::new(ProgressReporter::new(options.progress.clone()));
        reporter.report(session);

        let pending = session.pending_parts();
        debug!(
            upload_id = %session.id(),
            pending = pending.len(),
            parallelism = options.parallelism,
            "uploading parts"
        );

        if options.parallelism <= 1 || pending.len() <= 1 {
            for part_number in pending {
                send_part(coordinator, session, &reader, &reporter, part_number).await?;
            }
            Ok(())
        } else {
            upload_parallel(
                coordinator,
                session,
                reader,
                reporter,
                pending,
                options.parallelism,
            )
            .await
        }
    }

    /// Applies the failure policy and returns the error to surface.
    async fn fail(
        &self,
        coordinator: &ChunkedUploadCoordinator,
        session: &UploadSession,
        options: &UploadOptions,
        error: UploadError,
    ) -> UploadError {
        let error = if self.cancel.is_cancelled() && !error.is_cancelled() {
            UploadError::Cancelled
        } else {
            error
        };

        let keep = !options.abort_on_failure
            && !matches!(
                error,
                UploadError::Cancelled | UploadError::DeadlineExceeded(_)
            );
        if keep && session.is_active() {
            let resume = ResumeState::from_session(session);
            warn!(
                upload_id = %resume.upload_id,
                confirmed = resume.confirmed_parts.len(),
                error = %error,
                "upload interrupted, session kept for resume"
            );
            return UploadError::Interrupted {
                resume: Box::new(resume),
                source: Box::new(error),
            };
        }

        warn!(upload_id = %session.id(), error = %error, "upload failed");
        coordinator.abort(session, &error.to_string()).await;
        error
    }
}

fn check_resume(
    resume: &ResumeState,
    target: &UploadTarget,
    file_size: u64,
) -> Result<(), UploadError> {
    if &resume.target != target {
        return Err(UploadError::InvalidInput(format!(
            "resume state belongs to content language {}, not {}",
            resume.target.content_language_id, target.content_language_id
        )));
    }
    if resume.file_size != file_size {
        return Err(UploadError::InvalidInput(format!(
            "file is {file_size} bytes but the interrupted upload was {}",
            resume.file_size
        )));
    }
    Ok(())
}

/// Reads one part from disk and hands it to the coordinator.
async fn send_part(
    coordinator: &ChunkedUploadCoordinator,
    session: &UploadSession,
    reader: &PartReader,
    reporter: &ProgressReporter,
    part_number: u32,
) -> Result<(), UploadError> {
    let range = session.plan().require_range(part_number)?;
    let part_reader = reader.clone();
    let chunk = tokio::task::spawn_blocking(move || part_reader.read_part(&range))
        .await
        .map_err(|e| UploadError::Join(e.to_string()))??;

    let result = coordinator.upload_part(session, part_number, chunk).await?;
    if result.attempts > 0 {
        reporter.record_bytes(result.range.len);
    }
    reporter.report(session);
    Ok(())
}

/// Runs up to `parallelism` part workers over a shared queue.
///
/// The first failure cancels the remaining workers.
async fn upload_parallel(
    coordinator: &ChunkedUploadCoordinator,
    session: &Arc<UploadSession>,
    reader: PartReader,
    reporter: Arc<ProgressReporter>,
    pending: Vec<u32>,
    parallelism: usize,
) -> Result<(), UploadError> {
    let stop = coordinator.cancel_token().child_token();
    let workers = coordinator.clone().with_cancel(stop.clone());
    let queue = Arc::new(Mutex::new(VecDeque::from(pending)));

    let mut set = JoinSet::new();
    for _ in 0..parallelism {
        let coordinator = workers.clone();
        let session = Arc::clone(session);
        let reader = reader.clone();
        let reporter = Arc::clone(&reporter);
        let queue = Arc::clone(&queue);
        set.spawn(async move {
            loop {
                if coordinator.cancel_token().is_cancelled() {
                    return Err(UploadError::Cancelled);
                }
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(part_number) = next else {
                    return Ok(());
                };
                send_part(&coordinator, &session, &reader, &reporter, part_number).await?;
            }
        });
    }

    let mut first_error: Option<UploadError> = None;
    while let Some(joined) = set.join_next().await {
        let result = joined
            .map_err(|e| UploadError::Join(e.to_string()))
            .and_then(|r| r);
        let Err(err) = result else { continue };

        if first_error.is_none() {
            info!(error = %err, "stopping remaining part workers");
        }
        stop.cancel();
        // Workers stopped by a sibling report `Cancelled`; keep the real cause.
        let replace = match &first_error {
            None => true,
            Some(UploadError::Cancelled) => !err.is_cancelled(),
            Some(_) => false,
        };
        if replace {
            first_error = Some(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
