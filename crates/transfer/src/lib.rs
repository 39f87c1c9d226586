//! Multipart upload building blocks: part planning, random-access part
//! reads, session bookkeeping and progress tracking.
//!
//! Nothing in this crate touches the network; the uploader crate drives
//! these types against the control plane and object storage.

mod format;
mod plan;
mod progress;
mod reader;
mod session;
mod validation;

pub use format::{format_bytes, format_duration};
pub use plan::{PartPlan, PartRange, effective_chunk_size};
pub use progress::{ProgressCallback, ProgressReporter, SpeedCalculator};
pub use reader::PartReader;
pub use session::{PartRecord, UploadSession};
pub use validation::{upload_file_name, validate_content_type};

use cinevision_protocol::UploadState;

/// Default part size: 100 MiB.
///
/// Keeps multi-gigabyte videos around a few dozen parts while staying far
/// below the storage backend's part-count ceiling.
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of parts the storage backend accepts for one object.
pub const MAX_PARTS: u32 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("part {part_number} out of range (1..={total_parts})")]
    PartOutOfRange { part_number: u32, total_parts: u32 },

    #[error("part {part_number} has {actual} bytes, expected {expected}")]
    PartLengthMismatch {
        part_number: u32,
        expected: u64,
        actual: u64,
    },

    #[error("part {part_number} already recorded with a different tag")]
    PartAlreadyRecorded { part_number: u32 },

    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("upload incomplete, missing parts {missing:?}")]
    Incomplete { missing: Vec<u32> },

    #[error("file changed during upload: expected {expected} bytes, found {actual}")]
    FileChanged { expected: u64, actual: u64 },
}
