//! WAL Controller
//!
//! Ties the pieces together: recovery on open, appends to the active
//! segment, rotation, reads, batches and front truncation.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - **Reads** (read/scan/count/bounds): shared `RwLock` guard. Reads of the
//!   active segment go through positional I/O on the writer's handle, so
//!   they never move the append cursor.
//! - **Writes** (write/write_batch/truncate_front/sync/close): exclusive
//!   guard, serialized against everything else. Segment files are only
//!   created, renamed or deleted while it is held.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, WalError};

use super::batch::Batch;
use super::codec::{self, frame_len};
use super::directory::SegmentDirectory;
use super::recovery::{Recovered, WalRecovery, REWRITE_TMP};
use super::segment::{segment_file_name, Segment, SegmentEntry};
use super::writer::SegmentWriter;

/// Index assigned to the first entry of a fresh log
pub const FIRST_INDEX: u64 = 1;

/// A segmented write-ahead log
pub struct Wal {
    /// Configuration, fixed at open
    config: Config,

    /// Absolute path of the segment directory
    dir: PathBuf,

    /// `None` once the log has been closed
    state: RwLock<Option<WalState>>,
}

/// Mutable log state guarded by the lock
struct WalState {
    /// All segments; the last one is active
    segments: SegmentDirectory,

    /// Open handle on the active segment
    writer: SegmentWriter,

    /// Index of the oldest retained entry
    first_index: u64,

    /// One past the newest entry
    last_index: u64,
}

impl WalState {
    fn is_empty(&self) -> bool {
        self.first_index == self.last_index
    }

    fn out_of_range(&self, index: u64) -> WalError {
        WalError::OutOfRange {
            index,
            first: self.first_index,
            last: self.last_index,
        }
    }

    fn active_mut(&mut self) -> Result<&mut Segment> {
        self.segments
            .last_mut()
            .ok_or_else(|| WalError::Decode("log has no active segment".to_string()))
    }
}

/// Snapshot of one segment, for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub start_index: u64,
    pub entries: usize,
    pub remaining: u64,
    pub active: bool,
}

impl Wal {
    /// Open or create a log
    ///
    /// On startup:
    /// 1. Create the segment directory if it doesn't exist
    /// 2. Recover segments (drop empty files, cut torn tails)
    /// 3. Create a first segment if nothing survived
    /// 4. Open the last segment for appending
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.base_path)?;
        let dir = fs::canonicalize(&config.base_path)?;

        let Recovered {
            mut directory,
            resume_index,
            ..
        } = WalRecovery::recover(&dir, config.max_segment_size)?;

        if directory.is_empty() {
            let start_index = resume_index.unwrap_or(FIRST_INDEX);
            directory.push(Segment::create(&dir, start_index, config.max_segment_size)?);
        }

        let (first_index, last_index, writer) = match (directory.first(), directory.last()) {
            (Some(first), Some(active)) => (
                first.first_index(),
                active.next_index(),
                SegmentWriter::open(active.path())?,
            ),
            _ => return Err(WalError::Decode("log has no active segment".to_string())),
        };

        let mut state = WalState {
            segments: directory,
            writer,
            first_index,
            last_index,
        };

        let wal = Self {
            config,
            dir,
            state: RwLock::new(None),
        };

        // The empty successor of a full segment is removed by recovery;
        // put it back so appends start in a fresh segment.
        if state.active_mut()?.remaining() < wal.config.effective_rotation_threshold() {
            wal.rotate(&mut state)?;
        }

        info!(
            dir = %wal.dir.display(),
            first_index = state.first_index,
            last_index = state.last_index,
            segments = state.segments.len(),
            "opened log"
        );

        *wal.state.write() = Some(state);
        Ok(wal)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified base path
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder().base_path(path.as_ref()).build();
        Self::open(config)
    }

    /// Append one entry and return its index
    ///
    /// An `Err` means the entry was not assigned an index. If rotating to a
    /// new segment fails after the entry is written, the index is still
    /// returned and the rotation is retried by the next write.
    pub fn write(&self, payload: &[u8]) -> Result<u64> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(WalError::Closed)?;
        self.append(state, payload, self.config.sync_on_write)
    }

    /// Append every entry of `batch`, syncing once after the last one
    ///
    /// Not atomic: if an entry fails, the entries before it stay written.
    pub fn write_batch(&self, batch: &Batch) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(WalError::Closed)?;

        if batch.is_empty() {
            return Ok(());
        }

        for payload in batch.iter() {
            self.append(state, payload, false)?;
        }
        state.writer.sync()
    }

    /// Read the entry at `index`
    pub fn read(&self, index: u64) -> Result<Vec<u8>> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;

        if index < state.first_index || index >= state.last_index {
            return Err(state.out_of_range(index));
        }

        let position = state
            .segments
            .find_segment(index)
            .ok_or_else(|| state.out_of_range(index))?;
        let segment = state
            .segments
            .get(position)
            .ok_or_else(|| state.out_of_range(index))?;
        let offset = segment
            .find_entry(index)
            .ok_or_else(|| state.out_of_range(index))?;

        if state.segments.is_active(position) {
            state.writer.read_at(offset)
        } else {
            let file = File::open(segment.path())?;
            codec::decode_at(&file, offset)
        }
    }

    /// Visit every entry in index order until `visit` returns `false`
    pub fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;

        for segment in state.segments.iter() {
            if segment.is_empty() {
                continue;
            }
            let file = File::open(segment.path())?;
            for entry in segment.entries() {
                let payload = codec::decode_at(&file, entry.offset)?;
                if !visit(&payload) {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Discard every entry before `index`
    ///
    /// Whole segments below `index` are deleted; the segment containing
    /// `index` is rewritten without its older entries and renamed after
    /// its new start index.
    pub fn truncate_front(&self, index: u64) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(WalError::Closed)?;

        if index == 0
            || state.is_empty()
            || index < state.first_index
            || index > state.last_index
        {
            return Err(state.out_of_range(index));
        }
        if index == state.first_index {
            return Ok(());
        }

        let boundary = state
            .segments
            .find_segment(index)
            .ok_or_else(|| state.out_of_range(index))?;

        let removed = state.segments.splice_out_before(boundary);
        if let Some(first) = state.segments.first() {
            state.first_index = first.first_index();
        }
        for segment in &removed {
            segment.remove_file()?;
        }

        let rewrite_active = state.segments.is_active(0);
        let mut rewritten = Ok(());
        if let Some(segment) = state.segments.get_mut(0) {
            if segment.first_index() < index {
                rewritten = self.rewrite_segment(segment, index);
                // The rename may have landed even if a later step failed
                if rewrite_active && segment.path() != state.writer.path() {
                    state.writer = SegmentWriter::open(segment.path())?;
                }
            }
        }

        if let Some(first) = state.segments.first() {
            state.first_index = first.first_index();
        }
        rewritten?;

        info!(
            index,
            segments_removed = removed.len(),
            first_index = state.first_index,
            "truncated log front"
        );
        Ok(())
    }

    /// Force sync of the active segment to disk
    pub fn sync(&self) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(WalError::Closed)?;
        state.writer.sync()
    }

    /// Number of entries currently in the log
    pub fn count(&self) -> Result<usize> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;
        Ok(state.segments.entry_count())
    }

    /// Index of the oldest retained entry
    pub fn first_index(&self) -> Result<u64> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;
        Ok(state.first_index)
    }

    /// One past the newest entry (the index the next write gets)
    pub fn last_index(&self) -> Result<u64> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;
        Ok(state.last_index)
    }

    /// Per-segment snapshot, oldest first
    pub fn segments(&self) -> Result<Vec<SegmentInfo>> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(WalError::Closed)?;

        let count = state.segments.len();
        Ok(state
            .segments
            .iter()
            .enumerate()
            .map(|(position, segment)| SegmentInfo {
                path: segment.path().to_path_buf(),
                start_index: segment.first_index(),
                entries: segment.len(),
                remaining: segment.remaining(),
                active: position + 1 == count,
            })
            .collect())
    }

    /// Sync and release the active segment; the log is unusable afterwards
    pub fn close(&self) -> Result<()> {
        let mut guard = self.state.write();
        Self::shutdown(&mut guard)?;
        info!(dir = %self.dir.display(), "closed log");
        Ok(())
    }

    /// Close the log and delete its whole directory
    pub fn close_and_remove(&self) -> Result<()> {
        let mut guard = self.state.write();
        Self::shutdown(&mut guard)?;
        fs::remove_dir_all(&self.dir)?;
        info!(dir = %self.dir.display(), "removed log");
        Ok(())
    }

    /// Whether the log has been closed
    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the absolute segment directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write one entry and do its bookkeeping (called with the write lock held)
    fn append(&self, state: &mut WalState, payload: &[u8], sync: bool) -> Result<u64> {
        let threshold = self.config.effective_rotation_threshold();

        // A rotation that failed after an earlier append is retried here,
        // before anything is written.
        if state.active_mut()?.remaining() < threshold {
            self.rotate(state)?;
        }

        let (offset, written) = state.writer.append(payload, sync)?;

        let index = state.last_index;
        let active = state.active_mut()?;
        active.push_entry(SegmentEntry { index, offset }, written);
        let remaining = active.remaining();
        state.last_index += 1;

        // The entry is written and indexed; a rotation failure must not
        // turn that into an error the caller would retry.
        if remaining < threshold {
            if let Err(e) = self.rotate(state) {
                warn!(
                    dir = %self.dir.display(),
                    index,
                    error = %e,
                    "segment rotation failed, retrying on next write"
                );
            }
        }
        Ok(index)
    }

    /// Retire the active segment and start a new one at `last_index`
    fn rotate(&self, state: &mut WalState) -> Result<()> {
        state.writer.sync()?;

        let segment = Segment::create(&self.dir, state.last_index, self.config.max_segment_size)?;
        let writer = SegmentWriter::open(segment.path())?;

        debug!(
            retired = %state.writer.path().display(),
            active = %segment.path().display(),
            start_index = state.last_index,
            "rotated segment"
        );

        state.segments.push(segment);
        state.writer = writer;
        Ok(())
    }

    /// Copy the entries `>= index` of `segment` into a new file named
    /// after `index`, replacing the old file
    fn rewrite_segment(&self, segment: &mut Segment, index: u64) -> Result<()> {
        let tmp_path = self.dir.join(REWRITE_TMP);
        let source = File::open(segment.path())?;
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut entries = Vec::new();
        let mut used = 0;
        for entry in segment.entries().iter().filter(|e| e.index >= index) {
            let payload = codec::decode_at(&source, entry.offset)?;
            let offset = codec::encode(&mut tmp, &payload)?;
            used = offset + frame_len(payload.len());
            entries.push(SegmentEntry {
                index: entry.index,
                offset,
            });
        }
        tmp.sync_all()?;
        drop(tmp);
        drop(source);

        // Rename before removing: until the old file is gone, recovery
        // drops it as the superseded prefix of the new one.
        let old_path = segment.path().to_path_buf();
        let new_path = self.dir.join(segment_file_name(index));
        fs::rename(&tmp_path, &new_path)?;
        fsync_dir(&self.dir)?;

        debug!(
            path = %new_path.display(),
            start_index = index,
            entries = entries.len(),
            "rewrote segment"
        );

        let remaining = self.config.max_segment_size.saturating_sub(used);
        segment.replace(new_path, index, entries, remaining);

        fs::remove_file(&old_path)?;
        fsync_dir(&self.dir)?;
        debug!(path = %old_path.display(), "removed segment");
        Ok(())
    }

    fn shutdown(guard: &mut Option<WalState>) -> Result<()> {
        let state = guard.as_mut().ok_or(WalError::Closed)?;
        state.writer.sync()?;
        *guard = None;
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Some(state) = self.state.get_mut().as_mut() {
            if let Err(e) = state.writer.sync() {
                warn!(dir = %self.dir.display(), error = %e, "failed to sync log on drop");
            }
        }
    }
}

impl fmt::Display for Wal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.read();
        let Some(state) = guard.as_ref() else {
            return writeln!(f, "[write-ahead log] {} (closed)", self.dir.display());
        };

        writeln!(f, "[write-ahead log]")?;
        writeln!(f, "base: {}", self.dir.display())?;
        writeln!(f, "first_index: {}", state.first_index)?;
        writeln!(f, "last_index: {}", state.last_index)?;
        writeln!(f, "segments: {}", state.segments.len())?;
        for (position, segment) in state.segments.iter().enumerate() {
            let name = segment
                .path()
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            writeln!(
                f,
                "segment[{}]: {} start={} entries={} remaining={}{}",
                position,
                name,
                segment.first_index(),
                segment.len(),
                segment.remaining(),
                if state.segments.is_active(position) { " (active)" } else { "" }
            )?;
        }
        Ok(())
    }
}

/// fsync a directory so renames and deletions in it are durable
#[cfg(unix)]
fn fsync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
