//! Write-Ahead Log (WAL) Module
//!
//! Durable, append-only storage for opaque byte payloads, split across
//! segment files.
//!
//! ## Responsibilities
//! - Append entries and hand out strictly increasing indices
//! - Rotate to a new segment when the active one fills up
//! - Recover by replaying segment files, dropping torn tails
//! - Discard old entries by front truncation
//!
//! ## Directory Layout
//! ```text
//! {base_path}/
//!   ├── dat-0000000001.seg   entries 1..=163
//!   ├── dat-00000000a4.seg   entries 164..=330
//!   └── dat-000000014b.seg   active segment
//! ```
//!
//! ## Segment File Format
//! ```text
//! ┌─────────────────────────────────┐
//! │ Entry 1                         │
//! │ ┌──────────────┬──────────────┐ │
//! │ │ Len (8, LE)  │ Data (Len)   │ │
//! │ └──────────────┴──────────────┘ │
//! ├─────────────────────────────────┤
//! │ Entry 2                         │
//! │ ┌──────────────┬──────────────┐ │
//! │ │ Len (8, LE)  │ Data (Len)   │ │
//! │ └──────────────┴──────────────┘ │
//! └─────────────────────────────────┘
//! ```
//! No header, footer or checksum: a record that cannot be read completely
//! marks the end of its segment.

pub mod codec;
mod batch;
mod controller;
mod directory;
mod recovery;
mod segment;
mod writer;

pub use batch::Batch;
pub use codec::{decode, decode_at, encode, frame_len, HEADER_SIZE};
pub use controller::{SegmentInfo, Wal, FIRST_INDEX};
pub use directory::SegmentDirectory;
pub use recovery::{Recovered, RecoveryResult, WalRecovery, REWRITE_TMP};
pub use segment::{
    parse_segment_file_name, replay, segment_file_name, LoadReport, Replay, Segment,
    SegmentEntry, SEGMENT_PREFIX, SEGMENT_SUFFIX,
};
pub use writer::SegmentWriter;
