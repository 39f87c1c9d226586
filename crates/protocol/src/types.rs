use serde::{Deserialize, Serialize};

/// Identifies where an uploaded file belongs on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadTarget {
    /// Content-language row the video is attached to.
    pub content_language_id: String,
}

impl UploadTarget {
    pub fn new(content_language_id: impl Into<String>) -> Self {
        Self {
            content_language_id: content_language_id.into(),
        }
    }
}

/// Lifecycle state of a multipart upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    #[serde(rename = "initiated")]
    Initiated,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "completing")]
    Completing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "aborted")]
    Aborted,
}

impl UploadState {
    /// Returns `true` for states with no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Aborted)
    }
}

/// Upload status of a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

/// A part accepted by storage, as sent to `complete-multipart`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Observable state of an upload, recomputed after every part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub upload_id: String,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub parts_completed: u32,
    pub total_parts: u32,
    pub elapsed_ms: u64,
    pub bytes_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
}

impl ProgressSnapshot {
    /// Returns the upload progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0
    }

    /// Returns `true` once every part has been accepted.
    pub fn is_finished(&self) -> bool {
        self.total_parts > 0 && self.parts_completed == self.total_parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_state_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadState::Completing).unwrap(),
            "\"completing\""
        );
        assert!(UploadState::Aborted.is_terminal());
        assert!(UploadState::Completed.is_terminal());
        assert!(!UploadState::Uploading.is_terminal());
    }

    #[test]
    fn completed_part_uses_s3_field_names() {
        let json = serde_json::to_value(CompletedPart::new(3, "abc")).unwrap();
        assert_eq!(json["PartNumber"], 3);
        assert_eq!(json["ETag"], "abc");
    }

    #[test]
    fn progress_percentage() {
        let p = ProgressSnapshot {
            upload_id: "u1".into(),
            bytes_transferred: 250,
            total_bytes: 1000,
            parts_completed: 1,
            total_parts: 4,
            elapsed_ms: 10,
            bytes_per_second: 0.0,
            eta_secs: None,
        };
        assert!((p.percentage() - 25.0).abs() < f64::EPSILON);
        assert!(!p.is_finished());
    }

    #[test]
    fn progress_percentage_zero_total() {
        let p = ProgressSnapshot {
            upload_id: "u1".into(),
            bytes_transferred: 0,
            total_bytes: 0,
            parts_completed: 0,
            total_parts: 0,
            elapsed_ms: 0,
            bytes_per_second: 0.0,
            eta_secs: None,
        };
        assert_eq!(p.percentage(), 0.0);
        assert!(!p.is_finished());
    }
}
