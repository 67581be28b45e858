//! Segment
//!
//! One append-only file holding a contiguous run of entries, plus the
//! in-memory `(index → offset)` table for it. The table is rebuilt by
//! replaying the file on load and extended on every append.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, WalError};

use super::codec::{self, frame_len};

/// Prefix of every segment file name
pub const SEGMENT_PREFIX: &str = "dat-";

/// Suffix of every segment file name
pub const SEGMENT_SUFFIX: &str = ".seg";

/// Location of one entry inside its segment file (never persisted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    /// Logical index of the entry
    pub index: u64,
    /// Byte offset of the entry's record in the segment file
    pub offset: u64,
}

/// Outcome of replaying a segment's bytes
#[derive(Debug, Default)]
pub struct Replay {
    /// Every fully decodable record, in order
    pub entries: Vec<SegmentEntry>,
    /// Length of the valid prefix (end of the last complete record)
    pub valid_len: u64,
    /// Whether bytes past `valid_len` held an incomplete record
    pub torn_tail: bool,
}

/// Build the entry table for a stream of records.
///
/// The first record that does not decode completely ends the segment;
/// everything from there on is reported as a torn tail.
pub fn replay<R: Read>(mut reader: R, start_index: u64) -> Result<Replay> {
    let mut replay = Replay::default();
    let mut index = start_index;

    loop {
        match codec::decode(&mut reader) {
            Ok(Some(payload)) => {
                replay.entries.push(SegmentEntry {
                    index,
                    offset: replay.valid_len,
                });
                replay.valid_len += frame_len(payload.len());
                index += 1;
            }
            Ok(None) => break,
            Err(WalError::UnexpectedEof) => {
                replay.torn_tail = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(replay)
}

/// What loading a segment found on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Number of complete records
    pub entries: usize,
    /// Length of the valid prefix
    pub valid_len: u64,
    /// Bytes of torn tail cut off the file
    pub discarded: u64,
}

/// File name for a segment starting at `index`: `dat-<10 hex digits>.seg`
pub fn segment_file_name(index: u64) -> String {
    format!("{}{:010x}{}", SEGMENT_PREFIX, index, SEGMENT_SUFFIX)
}

/// Parse the start index out of a segment file name.
/// "dat-00000000ff.seg" → 255
pub fn parse_segment_file_name(name: &str) -> Result<u64> {
    let hex = name
        .strip_prefix(SEGMENT_PREFIX)
        .and_then(|rest| rest.strip_suffix(SEGMENT_SUFFIX))
        .ok_or_else(|| WalError::InvalidSegmentName(name.to_string()))?;

    if hex.is_empty() {
        return Err(WalError::InvalidSegmentName(name.to_string()));
    }
    u64::from_str_radix(hex, 16).map_err(|_| WalError::InvalidSegmentName(name.to_string()))
}

/// One segment file and its entry table
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    start_index: u64,
    entries: Vec<SegmentEntry>,
    remaining: u64,
}

impl Segment {
    /// Create an empty segment file in `dir` starting at `start_index`
    pub fn create(dir: &Path, start_index: u64, capacity: u64) -> Result<Self> {
        let path = dir.join(segment_file_name(start_index));
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        debug!(path = %path.display(), start_index, "created segment");

        Ok(Self {
            path,
            start_index,
            entries: Vec::new(),
            remaining: capacity,
        })
    }

    /// Load an existing segment file and rebuild its entry table.
    ///
    /// A torn tail is cut off the file so later appends land directly
    /// after the last complete record.
    pub fn load(path: &Path, max_segment_size: u64) -> Result<(Self, LoadReport)> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WalError::InvalidSegmentName(path.display().to_string()))?;
        let start_index = parse_segment_file_name(name)?;

        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let replay = replay(BufReader::new(file), start_index)?;
        let discarded = file_len.saturating_sub(replay.valid_len);

        if replay.torn_tail {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                discarded,
                "dropping torn record at segment tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let report = LoadReport {
            entries: replay.entries.len(),
            valid_len: replay.valid_len,
            discarded,
        };
        let segment = Self {
            path: path.to_path_buf(),
            start_index,
            entries: replay.entries,
            remaining: max_segment_size.saturating_sub(replay.valid_len),
        };
        Ok((segment, report))
    }

    /// Offset of the rightmost entry with `entry.index <= index`.
    ///
    /// `None` if `index` precedes the first entry.
    pub fn find_entry(&self, index: u64) -> Option<u64> {
        let pos = self.entries.partition_point(|e| e.index <= index);
        if pos == 0 {
            None
        } else {
            Some(self.entries[pos - 1].offset)
        }
    }

    /// Record an entry appended to the file
    pub(crate) fn push_entry(&mut self, entry: SegmentEntry, written: u64) {
        self.entries.push(entry);
        self.remaining = self.remaining.saturating_sub(written);
    }

    /// Swap in the result of a rewrite
    pub(crate) fn replace(
        &mut self,
        path: PathBuf,
        start_index: u64,
        entries: Vec<SegmentEntry>,
        remaining: u64,
    ) {
        self.path = path;
        self.start_index = start_index;
        self.entries = entries;
        self.remaining = remaining;
    }

    /// Delete the backing file
    pub(crate) fn remove_file(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "removed segment");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical index of the first entry
    pub fn first_index(&self) -> u64 {
        self.start_index
    }

    /// Logical index of the last entry, if any
    pub fn last_index(&self) -> Option<u64> {
        self.entries.last().map(|e| e.index)
    }

    /// Index the next entry appended to this segment would get
    pub fn next_index(&self) -> u64 {
        self.start_index + self.entries.len() as u64
    }

    pub fn entries(&self) -> &[SegmentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes left before the segment size cap is reached
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}
