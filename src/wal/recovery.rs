//! WAL Recovery
//!
//! Rebuilds the segment directory from the files on disk when a log is
//! opened.

use std::fs::{self, File};
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, WalError};

use super::directory::SegmentDirectory;
use super::segment::{self, parse_segment_file_name, Segment};

/// Scratch file used while a segment is rewritten by front truncation
pub const REWRITE_TMP: &str = "rewrite.tmp";

/// Handles rebuilding the log state after a restart or crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of segment files holding at least one complete record
    pub segments_loaded: usize,

    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of segment files without a single complete record
    pub empty_segments: usize,

    /// Bytes of torn records past the last complete record
    pub bytes_discarded: u64,

    /// Whether any segment ended in a partial write
    pub was_truncated: bool,

    /// Number of segments replaced by a rewritten copy of their tail
    pub superseded_segments: usize,
}

/// Everything `recover` rebuilt
#[derive(Debug)]
pub struct Recovered {
    /// Loaded segments, in index order
    pub directory: SegmentDirectory,

    /// Recovery stats
    pub result: RecoveryResult,

    /// Highest start index among removed empty segments.
    ///
    /// Used as the start of a fresh segment when nothing else survived.
    pub resume_index: Option<u64>,
}

impl WalRecovery {
    /// Recover the segments in `dir`
    ///
    /// This will:
    /// 1. Remove a scratch file left behind by an interrupted rewrite
    ///    (the segment it was copied from is still intact)
    /// 2. Delete segment files without any complete record
    /// 3. Cut torn records off segment tails
    /// 4. Delete a segment whose tail was rewritten into the next file
    ///    but which was not removed yet
    /// 5. Return the remaining segments in index order
    pub fn recover(dir: &Path, max_segment_size: u64) -> Result<Recovered> {
        let scratch = dir.join(REWRITE_TMP);
        if scratch.exists() {
            warn!(path = %scratch.display(), "removing leftover rewrite file");
            fs::remove_file(&scratch)?;
        }

        let mut result = RecoveryResult::default();
        let mut resume_index = None;
        let mut segments = Vec::new();

        for (start_index, path) in list_segment_files(dir)? {
            if fs::metadata(&path)?.len() == 0 {
                warn!(path = %path.display(), "removing empty segment file");
                fs::remove_file(&path)?;
                result.empty_segments += 1;
                resume_index = resume_index.max(Some(start_index));
                continue;
            }

            let (segment, report) = Segment::load(&path, max_segment_size)?;
            if report.discarded > 0 {
                result.was_truncated = true;
                result.bytes_discarded += report.discarded;
            }

            // Nothing but a torn record: the file is empty now
            if segment.is_empty() {
                warn!(path = %path.display(), "removing segment without complete records");
                fs::remove_file(&path)?;
                result.empty_segments += 1;
                resume_index = resume_index.max(Some(start_index));
                continue;
            }

            if let Some(prev) = segments.last() {
                if supersedes(&segment, prev)? {
                    warn!(
                        path = %prev.path().display(),
                        replaced_by = %path.display(),
                        "removing segment left behind by an interrupted truncation"
                    );
                    fs::remove_file(prev.path())?;
                    result.segments_loaded -= 1;
                    result.entries_recovered -= prev.len() as u64;
                    result.superseded_segments += 1;
                    segments.pop();
                }
            }

            debug!(
                path = %path.display(),
                start_index,
                entries = report.entries,
                "loaded segment"
            );
            result.segments_loaded += 1;
            result.entries_recovered += report.entries as u64;
            segments.push(segment);
        }

        let directory = SegmentDirectory::from_segments(segments)?;

        info!(
            segments = result.segments_loaded,
            entries = result.entries_recovered,
            empty_segments = result.empty_segments,
            bytes_discarded = result.bytes_discarded,
            superseded_segments = result.superseded_segments,
            "recovered log directory"
        );

        Ok(Recovered {
            directory,
            result,
            resume_index,
        })
    }

    /// Inspect the segments in `dir` without modifying anything
    pub fn verify(dir: &Path) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        let mut prev: Option<Range<u64>> = None;

        for (start_index, path) in list_segment_files(dir)? {
            let file = File::open(&path)?;
            let file_len = file.metadata()?.len();
            let replay = segment::replay(BufReader::new(file), start_index)?;

            if replay.torn_tail {
                result.was_truncated = true;
                result.bytes_discarded += file_len - replay.valid_len;
            }
            if replay.entries.is_empty() {
                result.empty_segments += 1;
                continue;
            }

            let range = start_index..start_index + replay.entries.len() as u64;
            if let Some(prev) = prev.take() {
                if overlaps_tail(&range, &prev)? {
                    result.segments_loaded -= 1;
                    result.entries_recovered -= prev.end - prev.start;
                    result.superseded_segments += 1;
                }
            }
            result.segments_loaded += 1;
            result.entries_recovered += range.end - range.start;
            prev = Some(range);
        }

        Ok(result)
    }
}

/// Whether `next` is a rewritten copy of the tail of `prev`
fn supersedes(next: &Segment, prev: &Segment) -> Result<bool> {
    overlaps_tail(
        &(next.first_index()..next.next_index()),
        &(prev.first_index()..prev.next_index()),
    )
}

/// `next` starting strictly inside `prev` must end exactly where `prev`
/// ends; any other overlap is corruption.
fn overlaps_tail(next: &Range<u64>, prev: &Range<u64>) -> Result<bool> {
    if next.start <= prev.start || next.start >= prev.end {
        return Ok(false);
    }
    if next.end != prev.end {
        return Err(WalError::Decode(format!(
            "segment starting at {} overlaps [{}, {}) but ends at {}",
            next.start, prev.start, prev.end, next.end
        )));
    }
    Ok(true)
}

/// Segment files in `dir`, sorted by start index
fn list_segment_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        match parse_segment_file_name(name) {
            Ok(start_index) => files.push((start_index, entry.path())),
            Err(_) => debug!(file = name, "skipping non-segment file"),
        }
    }

    files.sort_by_key(|(start_index, _)| *start_index);
    Ok(files)
}
