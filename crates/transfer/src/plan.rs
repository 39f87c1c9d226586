
use tracing::debug;

use crate::{MAX_PARTS, MIB, TransferError};

/// Byte range covered by one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number.
    pub part_number: u32,
    /// Offset of the first byte within the file.
    pub offset: u64,
    /// Number of bytes in this part.
    pub len: u64,
}

impl PartRange {
    /// One past the last byte of the part.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Splits a file of known size into contiguous fixed-size parts.
///
/// Parts are numbered `1..=total_parts`; every part except the last has
/// exactly `chunk_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    file_size: u64,
    chunk_size: u64,
    total_parts: u32,
}

impl PartPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if file_size == 0 {
            return Err(TransferError::InvalidInput("file size must be > 0".into()));
        }
        if chunk_size == 0 {
            return Err(TransferError::InvalidInput("chunk size must be > 0".into()));
        }

        let total_parts = file_size.div_ceil(chunk_size);
        let total_parts = u32::try_from(total_parts).map_err(|_| {
            TransferError::InvalidInput(format!("{total_parts} parts exceeds u32 range"))
        })?;

        Ok(Self {
            file_size,
            chunk_size,
            total_parts,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_parts(&self) -> u32 {
        self.total_parts
    }

    /// Returns the byte range of `part_number`, or `None` if out of range.
    pub fn range(&self, part_number: u32) -> Option<PartRange> {
        if part_number == 0 || part_number > self.total_parts {
            return None;
        }
        let offset = u64::from(part_number - 1) * self.chunk_size;
        let len = self.chunk_size.min(self.file_size - offset);
        Some(PartRange {
            part_number,
            offset,
            len,
        })
    }

    /// Like [`range`](Self::range) but with a typed error.
    pub fn require_range(&self, part_number: u32) -> Result<PartRange, TransferError> {
        self.range(part_number)
            .ok_or(TransferError::PartOutOfRange {
                part_number,
                total_parts: self.total_parts,
            })
    }

    /// Iterates over all parts in order.
    pub fn ranges(&self) -> impl Iterator<Item = PartRange> + '_ {
        (1..=self.total_parts).filter_map(|n| self.range(n))
    }

    /// Length of the final (possibly short) part.
    pub fn last_part_len(&self) -> u64 {
        self.file_size - u64::from(self.total_parts - 1) * self.chunk_size
    }
}

/// Returns a chunk size that keeps `file_size` within [`MAX_PARTS`].
///
/// The requested size is kept when it already fits; otherwise it grows to
/// the smallest whole MiB that does.
pub fn effective_chunk_size(file_size: u64, requested: u64) -> u64 {
    let requested = requested.max(1);
    if file_size.div_ceil(requested) <= u64::from(MAX_PARTS) {
        return requested;
    }

    let min_chunk = file_size.div_ceil(u64::from(MAX_PARTS));
    let grown = min_chunk.div_ceil(MIB) * MIB;
    debug!(
        file_size,
        requested,
        chunk_size = grown,
        "chunk size raised to stay within part limit"
    );
    grown
}
