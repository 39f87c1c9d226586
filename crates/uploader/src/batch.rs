//! Sequential multi-file uploads driven by a TOML manifest.
//!
//! ```toml
//! pause_secs = 5
//!
//! [[job]]
//! label = "A Hora do Mal (dublado)"
//! file = "/media/hora-do-mal-dub.mp4"
//! content_language_id = "4f1c..."
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cinevision_protocol::UploadTarget;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::UploadError;
use crate::retry::backoff;
use crate::types::{CompletionResult, UploadOptions};
use crate::upload::Uploader;

/// Default pause between two jobs.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(5);

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    /// Human-readable name used in logs; defaults to the file name.
    #[serde(default)]
    pub label: String,
    pub file: PathBuf,
    pub content_language_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl BatchJob {
    pub fn display_label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }

    pub fn target(&self) -> UploadTarget {
        UploadTarget::new(self.content_language_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchManifest {
    /// Seconds to wait between jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_secs: Option<u64>,
    #[serde(default, rename = "job")]
    pub jobs: Vec<BatchJob>,
}

impl BatchManifest {
    pub fn parse(text: &str) -> Result<Self, UploadError> {
        let manifest: Self =
            toml::from_str(text).map_err(|e| UploadError::Manifest(e.to_string()))?;
        for (i, job) in manifest.jobs.iter().enumerate() {
            if job.content_language_id.trim().is_empty() {
                return Err(UploadError::Manifest(format!(
                    "job {} has no content_language_id",
                    i + 1
                )));
            }
        }
        Ok(manifest)
    }

    /// Loads a manifest; relative job paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let text = std::fs::read_to_string(path)?;
        let mut manifest = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            for job in &mut manifest.jobs {
                if job.file.is_relative() {
                    job.file = base.join(&job.file);
                }
            }
        }
        Ok(manifest)
    }

    /// Pause between jobs: the manifest's own value, else `default`.
    pub fn pause(&self, default: Duration) -> Duration {
        self.pause_secs.map(Duration::from_secs).unwrap_or(default)
    }
}

/// Result of one batch job.
#[derive(Debug)]
pub struct BatchOutcome {
    pub label: String,
    pub file: PathBuf,
    pub result: Result<CompletionResult, UploadError>,
    pub duration: Duration,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Uploads `jobs` one after another, pausing `pause` between them.
///
/// A failed job does not stop the batch; cancellation does.
pub async fn run_batch(
    uploader: &Uploader,
    jobs: &[BatchJob],
    options: &UploadOptions,
    pause: Duration,
) -> Vec<BatchOutcome> {
    let cancel = uploader.cancel_token();
    let mut outcomes = Vec::with_capacity(jobs.len());

    for (i, job) in jobs.iter().enumerate() {
        if i > 0 && !pause.is_zero() && !backoff(pause, &cancel).await {
            break;
        }
        if cancel.is_cancelled() {
            break;
        }

        let label = job.display_label();
        info!(job = i + 1, total = jobs.len(), label = %label, "starting upload");

        let mut job_options = options.clone();
        if job.content_type.is_some() {
            job_options.content_type = job.content_type.clone();
        }

        let started = Instant::now();
        let result = uploader.upload(&job.file, &job.target(), job_options).await;
        let duration = started.elapsed();
        match &result {
            Ok(done) => info!(label = %label, object_url = %done.object_url, "upload finished"),
            Err(e) => error!(label = %label, error = %e, "upload failed"),
        }

        let cancelled = matches!(result, Err(UploadError::Cancelled));
        outcomes.push(BatchOutcome {
            label,
            file: job.file.clone(),
            result,
            duration,
        });
        if cancelled {
            break;
        }
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(
        succeeded,
        failed = outcomes.len() - succeeded,
        skipped = jobs.len() - outcomes.len(),
        "batch finished"
    );
    outcomes
}
