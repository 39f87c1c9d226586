use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::TransferError;
use crate::plan::PartRange;

/// Reads arbitrary parts of a file by byte range.
///
/// Every call opens its own handle, so concurrent workers can read disjoint
/// ranges without sharing a cursor. The file size is captured at open time
/// and re-checked on every read to catch files modified mid-upload.
#[derive(Debug, Clone)]
pub struct PartReader {
    path: PathBuf,
    file_size: u64,
}

impl PartReader {
    /// Opens `path` and records its current size.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(TransferError::InvalidInput(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file_size: meta.len(),
        })
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads exactly the bytes covered by `range`.
    ///
    /// Blocking; call from `spawn_blocking` inside async code.
    pub fn read_part(&self, range: &PartRange) -> Result<Bytes, TransferError> {
        if range.end() > self.file_size {
            return Err(TransferError::InvalidInput(format!(
                "part {} ends at byte {} past end of file ({} bytes)",
                range.part_number,
                range.end(),
                self.file_size
            )));
        }

        let mut file = std::fs::File::open(&self.path)?;
        let current = file.metadata()?.len();
        if current != self.file_size {
            return Err(TransferError::FileChanged {
                expected: self.file_size,
                actual: current,
            });
        }

        file.seek(SeekFrom::Start(range.offset))?;
        let len = usize::try_from(range.len).map_err(|_| {
            TransferError::InvalidInput(format!("part of {} bytes too large", range.len))
        })?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}
