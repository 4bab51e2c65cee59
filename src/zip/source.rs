use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ZipError};

use super::compression::{self, CompressionInfo};
use super::structures::{CompressionMethod, DosDateTime};

/// Where a pending entry's bytes come from.
#[derive(Debug, Clone)]
enum EntryData {
    Raw(Vec<u8>),
    File(PathBuf),
    Compressed {
        compression: CompressionMethod,
        crc32: u32,
        data: Vec<u8>,
    },
}

/// A request to add one entry to an archive.
///
/// Compression is deferred until the archive actually writes the entry, so
/// file sources are not read before then.
#[derive(Debug, Clone)]
pub struct EntrySource {
    name: String,
    uncompressed_size: u64,
    modified: DosDateTime,
    data: EntryData,
}

impl EntrySource {
    /// An entry holding `data`, timestamped with the current local time.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            uncompressed_size: data.len() as u64,
            modified: DosDateTime::now(),
            data: EntryData::Raw(data),
        }
    }

    /// An entry holding the contents of the file at `path`, timestamped with
    /// the file's modification time.
    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        let modified = metadata
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_else(|_| DosDateTime::now());
        Ok(Self {
            name: name.into(),
            uncompressed_size: metadata.len(),
            modified,
            data: EntryData::File(path.to_path_buf()),
        })
    }

    /// An entry whose payload is already compressed, e.g. copied from another
    /// archive with [`ZipArchive::compressed_bytes`](super::ZipArchive::compressed_bytes).
    pub fn precompressed(
        name: impl Into<String>,
        uncompressed_size: u64,
        modified: DosDateTime,
        compression: CompressionMethod,
        crc32: u32,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            uncompressed_size,
            modified,
            data: EntryData::Compressed {
                compression,
                crc32,
                data,
            },
        }
    }

    /// Override the timestamp recorded for this entry.
    pub fn with_modified(mut self, modified: DosDateTime) -> Self {
        self.modified = modified;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the payload before compression, as known when the source was
    /// created.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Produce the bytes to store, compressing raw payloads at `level`.
    pub fn compress(self, level: u32) -> Result<CompressionInfo> {
        match self.data {
            EntryData::Raw(data) => Ok(compression::compress(data, level)),
            EntryData::File(path) => {
                let data = fs::read(&path)?;
                Ok(compression::compress(data, level))
            }
            EntryData::Compressed {
                compression,
                crc32,
                data,
            } => {
                if let CompressionMethod::Unknown(method) = compression {
                    return Err(ZipError::Unsupported(format!(
                        "compression method {}",
                        method
                    )));
                }
                Ok(CompressionInfo {
                    compression,
                    crc32,
                    data,
                    uncompressed_size: self.uncompressed_size,
                })
            }
        }
    }
}

/// Order sources largest first. Equal sizes keep their relative order.
pub fn sort_largest_first(sources: &mut [EntrySource]) {
    sources.sort_by(|a, b| b.uncompressed_size.cmp(&a.uncompressed_size));
}
