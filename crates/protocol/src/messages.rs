use serde::{Deserialize, Serialize};

use crate::types::CompletedPart;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Starts a multipart upload for one content-language slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateMultipartRequest {
    pub content_language_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

/// Asks the control plane to sign an upload target for a single part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresignedUrlRequest {
    pub content_language_id: String,
    pub upload_id: String,
    pub part_number: u32,
}

/// Finalizes the object from the uploaded parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteMultipartRequest {
    pub content_language_id: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

/// Releases a multipart session and any parts stored under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortMultipartRequest {
    pub content_language_id: String,
    pub upload_id: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Reply to [`InitiateMultipartRequest`].
///
/// Older backends answer with `uploadId` and `key`; newer ones add
/// `storage_key` and may omit the presigned URL list entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateMultipartResponse {
    #[serde(rename = "uploadId", alias = "upload_id")]
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(
        rename = "presignedUrls",
        alias = "presigned_urls",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub presigned_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<u32>,
}

impl InitiateMultipartResponse {
    /// Storage key of the object being assembled, preferring `storage_key`.
    pub fn object_key(&self) -> Option<&str> {
        self.storage_key
            .as_deref()
            .or(self.key.as_deref())
            .filter(|k| !k.is_empty())
    }
}

/// Reply to [`PresignedUrlRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresignedUrlResponse {
    pub url: String,
}

/// Nested `data` block of [`CompleteMultipartResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_status: Option<String>,
}

/// Reply to [`CompleteMultipartRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteMultipartResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CompletionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CompleteMultipartResponse {
    /// URL of the finalized object, if the backend reported one.
    pub fn object_url(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.video_url.as_deref())
            .or(self.video_url.as_deref())
            .filter(|u| !u.is_empty())
    }
}
