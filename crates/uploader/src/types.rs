use std::path::Path;
use std::time::Duration;

use cinevision_protocol::{CompletedPart, UploadTarget};
use cinevision_transfer::{DEFAULT_CHUNK_SIZE, PartRange, ProgressCallback, UploadSession};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Caller-tunable knobs for [`Uploader::upload`](crate::Uploader::upload).
#[derive(Clone)]
pub struct UploadOptions {
    /// Requested part size; raised when the file would exceed the part limit.
    pub chunk_size: u64,
    /// Total attempts per part, including the first.
    pub max_retries_per_part: u32,
    /// Number of parts in flight at once.
    pub parallelism: usize,
    /// Inferred from the file extension when `None`.
    pub content_type: Option<String>,
    /// Wall-clock budget for the whole upload.
    pub session_deadline: Option<Duration>,
    pub progress: Option<ProgressCallback>,
    /// Continue a session from an earlier run instead of opening a new one.
    pub resume: Option<ResumeState>,
    /// Abort the remote session when a part or finalization fails.
    ///
    /// When `false` the session is left open and the error carries a
    /// [`ResumeState`].
    pub abort_on_failure: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries_per_part: 3,
            parallelism: 1,
            content_type: None,
            session_deadline: None,
            progress: None,
            resume: None,
            abort_on_failure: true,
        }
    }
}

impl UploadOptions {
    pub(crate) fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidInput("chunk size must be > 0".into()));
        }
        if self.max_retries_per_part == 0 {
            return Err(UploadError::InvalidInput(
                "at least one attempt per part is required".into(),
            ));
        }
        if self.parallelism == 0 {
            return Err(UploadError::InvalidInput("parallelism must be >= 1".into()));
        }
        Ok(())
    }
}

/// Everything needed to continue an interrupted session later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub upload_id: String,
    pub storage_key: String,
    pub target: UploadTarget,
    pub file_size: u64,
    pub chunk_size: u64,
    /// Parts storage already accepted, ascending.
    pub confirmed_parts: Vec<CompletedPart>,
}

impl ResumeState {
    pub fn from_session(session: &UploadSession) -> Self {
        let plan = session.plan();
        Self {
            upload_id: session.id(),
            storage_key: session.storage_key(),
            target: session.target(),
            file_size: plan.file_size(),
            chunk_size: plan.chunk_size(),
            confirmed_parts: session.completed_parts(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), UploadError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

/// Outcome of one successfully stored part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResult {
    pub range: PartRange,
    pub etag: String,
    /// Attempts spent on this part; `0` when it was already stored.
    pub attempts: u32,
}

impl PartResult {
    pub fn part_number(&self) -> u32 {
        self.range.part_number
    }
}

/// Outcome of a finalized upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub upload_id: String,
    pub storage_key: String,
    /// Reference to the assembled object.
    pub object_url: String,
    pub file_name: Option<String>,
    pub processing_status: Option<String>,
    pub total_parts: u32,
    pub total_bytes: u64,
}
