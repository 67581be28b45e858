//! # segwal
//!
//! A segmented write-ahead log with:
//! - Durable append-only writes of opaque byte payloads
//! - Crash recovery with partial write handling
//! - Segment rotation and front truncation
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     WAL Controller                           │
//! │        (RwLock: shared reads / exclusive writes)             │
//! └───────┬─────────────────────┬──────────────────────┬────────┘
//!         │                     │                      │
//!         ▼                     ▼                      ▼
//!  ┌─────────────┐      ┌──────────────┐       ┌─────────────┐
//!  │  Recovery   │      │  Segment     │       │  Segment    │
//!  │  (replay)   │      │  Directory   │       │  Writer     │
//!  └──────┬──────┘      └──────┬───────┘       └──────┬──────┘
//!         │                    │                      │
//!         ▼                    ▼                      ▼
//!  ┌─────────────────────────────────────────────────────────┐
//!  │          Segments + Entry Codec ([len][payload])         │
//!  └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use segwal::{Config, Wal};
//!
//! let wal = Wal::open(Config::builder().base_path("log").build())?;
//! let index = wal.write(b"hello")?;
//! assert_eq!(wal.read(index)?, b"hello");
//! wal.close()?;
//! # Ok::<(), segwal::WalError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{WalError, Result};
pub use config::Config;
pub use wal::{Batch, Wal};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of segwal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
