//! Chunked multipart uploads for CineVision.
//!
//! A file is split into parts, each part is PUT to a presigned storage
//! target handed out by the control plane, and the control plane then
//! assembles the object from the part tags. [`ChunkedUploadCoordinator`]
//! drives a single session; [`Uploader`] wraps it for whole files and
//! [`run_batch`] for several files in a row.

mod batch;
mod content_type;
mod control_plane;
mod coordinator;
mod error;
mod retry;
mod storage;
mod types;
mod upload;

#[cfg(test)]
mod mock;

pub use batch::{BatchJob, BatchManifest, BatchOutcome, DEFAULT_BATCH_PAUSE, run_batch};
pub use content_type::content_type_for_path;
pub use control_plane::{BoxFuture, ControlPlane, HttpControlPlane};
pub use coordinator::ChunkedUploadCoordinator;
pub use error::{TransportError, UploadError};
pub use retry::RetryPolicy;
pub use storage::{HttpPartStore, PartStore, normalize_etag};
pub use types::{CompletionResult, PartResult, ResumeState, UploadOptions};
pub use upload::Uploader;
