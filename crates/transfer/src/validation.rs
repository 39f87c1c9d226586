use std::path::Path;

use crate::TransferError;

/// Returns the file name sent to the control plane for `path`.
///
/// Rejects paths without a final component and names that are not valid
/// UTF-8, since the name ends up in the object key.
pub fn upload_file_name(path: &Path) -> Result<String, TransferError> {
    let name = path.file_name().ok_or_else(|| {
        TransferError::InvalidInput(format!("path has no file name: {}", path.display()))
    })?;
    let name = name.to_str().ok_or_else(|| {
        TransferError::InvalidInput(format!("file name is not UTF-8: {}", path.display()))
    })?;
    if name.trim().is_empty() {
        return Err(TransferError::InvalidInput("empty file name".into()));
    }
    Ok(name.to_string())
}

/// Validates a MIME content type of the form `type/subtype`.
pub fn validate_content_type(content_type: &str) -> Result<(), TransferError> {
    let trimmed = content_type.trim();
    if trimmed.is_empty() {
        return Err(TransferError::InvalidInput("content type is empty".into()));
    }
    match trimmed.split_once('/') {
        Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !sub.contains('/') => Ok(()),
        _ => Err(TransferError::InvalidInput(format!(
            "malformed content type: {content_type}"
        ))),
    }
}
