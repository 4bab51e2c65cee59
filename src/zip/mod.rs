//! An in-place, randomly mutable ZIP container.
//!
//! Entries can be added and removed without rewriting the whole archive.
//! Each entry (local header plus payload) occupies one power-of-two block
//! handed out by a buddy allocator; the central directory follows the last
//! block and is rewritten whenever it has to move.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed ZIP records (EOCD, constants, MS-DOS timestamps)
//! - [`compression`]: DEFLATE-or-store decision and CRC32
//! - [`ArchiveEntry`] / [`EntrySource`]: stored entries and pending additions
//! - [`BuddyAllocator`]: free space bookkeeping
//! - [`ZipParser`]: reading the trailer, directory and local headers
//! - [`ZipExtractor`]: reading and verifying payloads
//! - [`ZipArchive`]: the container tying it all together
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Gaps between entries are allowed by the format; other readers simply
//! follow the directory offsets.
//!
//! ## Limitations
//!
//! - No ZIP64, encryption or multi-disk archives
//! - Only STORED and DEFLATE compression methods

mod allocator;
mod archive;
pub mod compression;
mod entry;
mod extractor;
mod options;
mod parser;
mod progress;
mod source;
pub mod structures;

pub use allocator::{BuddyAllocator, MIN_BLOCK_SHIFT};
pub use archive::ZipArchive;
pub use compression::{CompressionInfo, DEFAULT_COMPRESSION_LEVEL};
pub use entry::ArchiveEntry;
pub use extractor::ZipExtractor;
pub use options::ArchiveOptions;
pub use parser::{LocalHeaderInfo, TrailerInfo, ZipParser};
pub use progress::{NoProgress, ProgressSink};
pub use source::{EntrySource, sort_largest_first};
pub use structures::{CompressionMethod, DosDateTime, EndOfCentralDirectory};
