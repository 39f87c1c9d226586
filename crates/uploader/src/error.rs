//! Upload error types.

use std::time::Duration;

use cinevision_protocol::UploadState;
use cinevision_transfer::TransferError;

use crate::types::ResumeState;

/// A failed network exchange with the control plane or storage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage response has no ETag header")]
    MissingEtag,

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts, connection faults, 5xx and 429 are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Connection(_) => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// A 4xx other than 429, e.g. an expired presigned target.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if (400..500).contains(status) && *status != 429)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() || e.is_body() {
            TransportError::Connection(e.to_string())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Errors produced while driving a multipart upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("control plane refused to start the upload: {source}")]
    Initiation {
        #[source]
        source: TransportError,
    },

    #[error("part {part_number} failed after {attempts} attempt(s): {cause}")]
    PartUpload {
        part_number: u32,
        attempts: u32,
        #[source]
        cause: TransportError,
    },

    #[error("cannot complete upload, missing parts {missing:?}")]
    IncompleteUpload { missing: Vec<u32> },

    #[error("part list does not match accepted parts: {0}")]
    PartSetMismatch(String),

    #[error("backend rejected finalization (status {status:?}): {message}")]
    Finalization { status: Option<u16>, message: String },

    #[error("session {upload_id} is {state:?}")]
    SessionClosed {
        upload_id: String,
        state: UploadState,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("session deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("upload interrupted, session {} kept for resume: {source}", .resume.upload_id)]
    Interrupted {
        resume: Box<ResumeState>,
        #[source]
        source: Box<UploadError>,
    },

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("task join error: {0}")]
    Join(String),
}

impl UploadError {
    /// Part number the failure is attributed to, if any.
    pub fn part_number(&self) -> Option<u32> {
        match self {
            UploadError::PartUpload { part_number, .. } => Some(*part_number),
            UploadError::Interrupted { source, .. } => source.part_number(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
