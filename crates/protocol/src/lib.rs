//! Wire types shared by the CineVision upload tooling.
//!
//! Request and response payloads mirror the backend's
//! `/content-language-upload/*` endpoints field for field.

pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{
    AbortMultipartRequest, CompleteMultipartRequest, CompleteMultipartResponse, CompletionData,
    InitiateMultipartRequest, InitiateMultipartResponse, PresignedUrlRequest,
    PresignedUrlResponse,
};
pub use types::{CompletedPart, PartStatus, ProgressSnapshot, UploadState, UploadTarget};
