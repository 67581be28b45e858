//! Segment Writer
//!
//! Owns the open file handle of the active segment.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

use crate::error::Result;

use super::codec::{self, frame_len};

/// Appends records to the active segment file
#[derive(Debug)]
pub struct SegmentWriter {
    file: File,
    path: PathBuf,
    /// End of the last complete record (next append offset)
    position: u64,
}

impl SegmentWriter {
    /// Open a segment file for appending, positioned at its end
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let position = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            position,
        })
    }

    /// Append one record, optionally syncing it to disk.
    ///
    /// Returns `(offset, bytes_written)`. If the write or the sync fails,
    /// the file is cut back to its previous length and the error returned.
    pub fn append(&mut self, payload: &[u8], sync: bool) -> Result<(u64, u64)> {
        let offset = self.position;

        if let Err(e) = self.write_record(offset, payload, sync) {
            self.rollback(offset);
            return Err(e);
        }

        let len = frame_len(payload.len());
        self.position = offset + len;
        trace!(path = %self.path.display(), offset, len, "appended record");
        Ok((offset, len))
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Decode the record at `offset` through this handle
    pub fn read_at(&self, offset: u64) -> Result<Vec<u8>> {
        codec::decode_at(&self.file, offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next append offset
    pub fn position(&self) -> u64 {
        self.position
    }

    fn write_record(&mut self, offset: u64, payload: &[u8], sync: bool) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        codec::encode(&mut self.file, payload)?;
        if sync {
            self.sync()?;
        }
        Ok(())
    }

    fn rollback(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            warn!(path = %self.path.display(), error = %e, "failed to roll back partial append");
        }
    }
}
