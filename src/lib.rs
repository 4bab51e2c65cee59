//! # buddyzip
//!
//! A ZIP archive that can be modified in place.
//!
//! Adding or removing an entry touches only that entry's block and the
//! central directory, so large archives can be updated without being copied.
//! Free space left by removed entries is tracked by a buddy allocator and
//! reused by later additions. Archives written by other tools are accepted
//! and normalized the first time they are opened for writing.
//!
//! ## Features
//!
//! - Add single entries or batches (largest first, one directory rewrite)
//! - Remove entries and reuse their space
//! - Extract with CRC32 verification
//! - Copy compressed payloads between archives without recompressing
//! - STORED and DEFLATE compression methods
//!
//! ## Example
//!
//! ```no_run
//! use buddyzip::{EntrySource, ZipArchive};
//!
//! fn main() -> buddyzip::Result<()> {
//!     let mut archive = ZipArchive::open("data.zip")?;
//!     archive.add(EntrySource::from_bytes("hello.txt", b"hello".to_vec()))?;
//!
//!     let entry = archive.get("hello.txt").cloned().expect("just added");
//!     assert_eq!(archive.extract(&entry)?, b"hello");
//!
//!     archive.remove(&entry)?;
//!     archive.close()
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::RandomAccessFile;
pub use zip::{
    ArchiveEntry, ArchiveOptions, BuddyAllocator, CompressionMethod, DosDateTime, EntrySource,
    NoProgress, ProgressSink, ZipArchive,
};
