//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery of a clean log directory
//! - Removal of empty segment files
//! - Recovery with partial writes (torn tail)
//! - Cleanup of an interrupted segment rewrite
//! - Verify mode (stats only, nothing modified)
//! - Crash-tail handling end to end through `Wal::open`

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use segwal::wal::{encode, frame_len, segment_file_name, WalRecovery, REWRITE_TMP};
use segwal::{Config, Wal, WalError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

/// Write a segment file holding `payloads`, starting at `start_index`
fn write_segment(dir: &Path, start_index: u64, payloads: &[&[u8]]) -> PathBuf {
    let path = dir.join(segment_file_name(start_index));
    let mut file = File::create(&path).unwrap();
    for payload in payloads {
        encode(&mut file, payload).unwrap();
    }
    file.sync_all().unwrap();
    path
}

/// Append a record header promising `claimed` bytes followed by `actual` bytes
fn append_torn_record(path: &Path, claimed: u64, actual: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&claimed.to_le_bytes()).unwrap();
    file.write_all(actual).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Recover: Clean Directory Tests
// =============================================================================

#[test]
fn test_recover_empty_directory() {
    let (_temp, dir) = setup_temp_dir();

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(recovered.directory.is_empty());
    assert_eq!(recovered.result.segments_loaded, 0);
    assert_eq!(recovered.result.entries_recovered, 0);
    assert!(!recovered.result.was_truncated);
    assert_eq!(recovered.resume_index, None);
}

#[test]
fn test_recover_multiple_segments_in_index_order() {
    let (_temp, dir) = setup_temp_dir();
    // Written out of order on purpose
    write_segment(&dir, 4, &[b"d", b"e"]);
    write_segment(&dir, 1, &[b"a", b"b", b"c"]);

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert_eq!(recovered.result.segments_loaded, 2);
    assert_eq!(recovered.result.entries_recovered, 5);
    let starts: Vec<u64> = recovered.directory.iter().map(|s| s.first_index()).collect();
    assert_eq!(starts, vec![1, 4]);
}

#[test]
fn test_recover_ignores_foreign_files() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a"]);
    fs::write(dir.join("notes.txt"), b"not a segment").unwrap();
    fs::create_dir(dir.join("dat-0000000009.seg.d")).unwrap();

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert_eq!(recovered.result.segments_loaded, 1);
    assert!(dir.join("notes.txt").exists());
}

#[test]
fn test_recover_rejects_gap_between_segments() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a", b"b"]);
    write_segment(&dir, 10, &[b"j"]);

    let result = WalRecovery::recover(&dir, 16384);

    assert!(matches!(result, Err(WalError::Decode(_))));
}

// =============================================================================
// Recover: Empty Segment Tests
// =============================================================================

#[test]
fn test_recover_removes_zero_byte_segments() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a", b"b"]);
    let empty = write_segment(&dir, 3, &[]);

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(!empty.exists());
    assert_eq!(recovered.result.empty_segments, 1);
    assert_eq!(recovered.result.segments_loaded, 1);
    assert_eq!(recovered.resume_index, Some(3));
}

#[test]
fn test_recover_resume_index_from_highest_empty_segment() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 0x20, &[]);
    write_segment(&dir, 0x40, &[]);

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(recovered.directory.is_empty());
    assert_eq!(recovered.resume_index, Some(0x40));
}

#[test]
fn test_recover_removes_segment_with_only_torn_record() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 7, &[]);
    append_torn_record(&path, 50, b"abc");

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(!path.exists());
    assert!(recovered.directory.is_empty());
    assert!(recovered.result.was_truncated);
    assert_eq!(recovered.resume_index, Some(7));
}

// =============================================================================
// Recover: Partial Write Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_recover_partial_header_at_tail() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"good"]);
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[1u8, 2, 3]).unwrap();
    }

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert_eq!(recovered.result.entries_recovered, 1);
    assert_eq!(recovered.result.bytes_discarded, 3);
    assert!(recovered.result.was_truncated);
    assert_eq!(fs::metadata(&path).unwrap().len(), frame_len(4));
}

#[test]
fn test_recover_partial_data_at_tail() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"first", b"second"]);
    append_torn_record(&path, 20, b"only-part");

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert_eq!(recovered.result.entries_recovered, 2);
    assert_eq!(recovered.result.bytes_discarded, 8 + 9);
    assert!(recovered.result.was_truncated);
}

// =============================================================================
// Recover: Interrupted Rewrite Tests
// =============================================================================

#[test]
fn test_recover_removes_leftover_rewrite_file() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a"]);
    fs::write(dir.join(REWRITE_TMP), b"half-written").unwrap();

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(!dir.join(REWRITE_TMP).exists());
    assert_eq!(recovered.result.segments_loaded, 1);
}

// =============================================================================
// Verify Tests (stats only, nothing modified)
// =============================================================================

#[test]
fn test_verify_clean_directory() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a", b"b", b"c"]);
    write_segment(&dir, 4, &[b"d"]);

    let result = WalRecovery::verify(&dir).unwrap();

    assert_eq!(result.segments_loaded, 2);
    assert_eq!(result.entries_recovered, 4);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_does_not_modify_files() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"a"]);
    append_torn_record(&path, 30, b"xy");
    let empty = write_segment(&dir, 2, &[]);
    let len_before = fs::metadata(&path).unwrap().len();

    let result = WalRecovery::verify(&dir).unwrap();

    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, 8 + 2);
    assert_eq!(result.empty_segments, 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
    assert!(empty.exists());
}

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"one", b"two"]);
    append_torn_record(&path, 12, b"t");

    let verify_result = WalRecovery::verify(&dir).unwrap();
    let recover_result = WalRecovery::recover(&dir, 16384).unwrap().result;

    assert_eq!(recover_result.entries_recovered, verify_result.entries_recovered);
    assert_eq!(recover_result.bytes_discarded, verify_result.bytes_discarded);
    assert_eq!(recover_result.was_truncated, verify_result.was_truncated);
}

// =============================================================================
// Crash-Tail Handling Through Wal::open
// =============================================================================

#[test]
fn test_open_exposes_only_complete_records() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"hello"]);
    append_torn_record(&path, 100, b"0123456789");

    let wal = Wal::open(Config::builder().base_path(&dir).build()).unwrap();

    assert_eq!(wal.count().unwrap(), 1);
    assert_eq!(wal.first_index().unwrap(), 1);
    assert_eq!(wal.last_index().unwrap(), 2);
    assert_eq!(wal.read(1).unwrap(), b"hello");
    assert!(matches!(wal.read(2), Err(WalError::OutOfRange { .. })));
}

#[test]
fn test_writes_after_torn_tail_survive_reopen() {
    let (_temp, dir) = setup_temp_dir();
    let path = write_segment(&dir, 1, &[b"hello"]);
    append_torn_record(&path, 100, b"0123456789");
    let config = Config::builder().base_path(&dir).build();

    {
        let wal = Wal::open(config.clone()).unwrap();
        assert_eq!(wal.write(b"world").unwrap(), 2);
        wal.close().unwrap();
    }

    let wal = Wal::open(config).unwrap();
    assert_eq!(wal.count().unwrap(), 2);
    assert_eq!(wal.read(1).unwrap(), b"hello");
    assert_eq!(wal.read(2).unwrap(), b"world");
}

#[test]
fn test_open_after_crash_before_first_record() {
    let (_temp, dir) = setup_temp_dir();
    // Crash right after segment creation
    write_segment(&dir, 1, &[]);

    let wal = Wal::open(Config::builder().base_path(&dir).build()).unwrap();

    assert_eq!(wal.count().unwrap(), 0);
    assert_eq!(wal.write(b"first").unwrap(), 1);
}

// =============================================================================
// Interrupted Front Truncation
// =============================================================================

/// Entries 1..=7 in segment 1, 8..=10 in segment 8
fn write_two_segments(dir: &Path) -> Vec<Vec<u8>> {
    let payloads: Vec<Vec<u8>> = (1..=10).map(|i| format!("entry-{}", i).into_bytes()).collect();
    let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    write_segment(dir, 1, &refs[..7]);
    write_segment(dir, 8, &refs[7..]);
    payloads
}

#[test]
fn test_crash_before_rewrite_rename_keeps_all_entries() {
    let (_temp, dir) = setup_temp_dir();
    let payloads = write_two_segments(&dir);
    // Tail 3..=7 copied into the scratch file, nothing renamed yet
    let tail: Vec<&[u8]> = payloads[2..7].iter().map(Vec::as_slice).collect();
    let scratch = write_segment(&dir, 3, &tail);
    fs::rename(&scratch, dir.join(REWRITE_TMP)).unwrap();

    let wal = Wal::open(Config::builder().base_path(&dir).build()).unwrap();

    assert!(!dir.join(REWRITE_TMP).exists());
    assert_eq!(wal.first_index().unwrap(), 1);
    assert_eq!(wal.last_index().unwrap(), 11);
    for i in 1..=10 {
        assert_eq!(wal.read(i).unwrap(), payloads[i as usize - 1]);
    }
}

#[test]
fn test_crash_after_rewrite_rename_completes_truncation() {
    let (_temp, dir) = setup_temp_dir();
    let payloads = write_two_segments(&dir);
    // Rewritten segment renamed into place, old segment not removed yet
    let tail: Vec<&[u8]> = payloads[2..7].iter().map(Vec::as_slice).collect();
    write_segment(&dir, 3, &tail);

    let recovered = WalRecovery::recover(&dir, 16384).unwrap();

    assert!(!dir.join(segment_file_name(1)).exists());
    assert_eq!(recovered.result.superseded_segments, 1);
    assert_eq!(recovered.result.segments_loaded, 2);
    assert_eq!(recovered.result.entries_recovered, 8);

    let wal = Wal::open(Config::builder().base_path(&dir).build()).unwrap();
    assert_eq!(wal.first_index().unwrap(), 3);
    assert_eq!(wal.last_index().unwrap(), 11);
    assert!(matches!(wal.read(2), Err(WalError::OutOfRange { .. })));
    for i in 3..=10 {
        assert_eq!(wal.read(i).unwrap(), payloads[i as usize - 1]);
    }
}

#[test]
fn test_verify_counts_superseded_segment_once() {
    let (_temp, dir) = setup_temp_dir();
    let payloads = write_two_segments(&dir);
    let tail: Vec<&[u8]> = payloads[4..7].iter().map(Vec::as_slice).collect();
    write_segment(&dir, 5, &tail);

    let verify_result = WalRecovery::verify(&dir).unwrap();

    assert!(dir.join(segment_file_name(1)).exists());
    assert_eq!(verify_result.superseded_segments, 1);
    assert_eq!(verify_result.entries_recovered, 6);

    let recover_result = WalRecovery::recover(&dir, 16384).unwrap().result;
    assert_eq!(recover_result, verify_result);
}

#[test]
fn test_recover_rejects_overlap_with_different_end() {
    let (_temp, dir) = setup_temp_dir();
    write_segment(&dir, 1, &[b"a", b"b", b"c", b"d"]);
    // Starts inside segment 1 but ends before it
    write_segment(&dir, 2, &[b"b"]);

    let result = WalRecovery::recover(&dir, 16384);

    assert!(matches!(result, Err(WalError::Decode(_))));
}
