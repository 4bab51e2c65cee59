//! Low-level ZIP archive parser.
//!
//! This module reads the trailer and central directory of an existing file
//! through a [`RandomAccessFile`].
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to get metadata for all files
//! 3. Local File Headers are only consulted when an entry has to be moved

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashSet;
use std::io::{self, Cursor};

use crate::error::{Result, ZipError};
use crate::io::{BinaryRead, RandomAccessFile};

use super::entry::ArchiveEntry;
use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Location and contents of the trailer found in a file.
#[derive(Debug, Clone)]
pub struct TrailerInfo {
    pub eocd: EndOfCentralDirectory,
    /// Offset of the EOCD signature.
    pub offset: u64,
}

/// Fields of a Local File Header that may differ from the directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeaderInfo {
    pub name: String,
    pub name_length: u16,
    pub extra_length: u16,
}

impl LocalHeaderInfo {
    /// Header size including the variable-length fields.
    pub fn size(&self) -> u64 {
        LFH_SIZE + self.name_length as u64 + self.extra_length as u64
    }
}

/// Low-level ZIP file parser over a borrowed file handle.
pub struct ZipParser<'a> {
    /// The underlying data source
    source: &'a mut RandomAccessFile,
    /// Total size of the archive in bytes
    size: u64,
}

impl<'a> ZipParser<'a> {
    pub fn new(source: &'a mut RandomAccessFile) -> Result<Self> {
        let size = source.len()?;
        Ok(Self { source, size })
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.source.seek_to(offset)?;
        Ok(self.source.read_byte_array(len)?)
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The EOCD is located at the end of the ZIP file. This method
    /// handles both the simple case (no comment) and archives with
    /// comments by searching backwards for the signature. A candidate only
    /// counts when its declared comment length matches the bytes that
    /// actually follow it, so signature bytes inside a comment are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ZipError::Format`] if no valid EOCD can be found.
    pub fn find_eocd(&mut self) -> Result<TrailerInfo> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            return Err(ZipError::format("file too small for a ZIP trailer"));
        }

        // Optimization: First try the simple case where there's no comment.
        let offset = self.size - eocd_size;
        let buf = self.read_at(offset, EndOfCentralDirectory::SIZE)?;
        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && &buf[20..22] == b"\x00\x00" {
            let eocd = EndOfCentralDirectory::from_bytes(&buf)?;
            return Ok(TrailerInfo { eocd, offset });
        }

        // EOCD not at expected location - search backwards from the end.
        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;
        let buf = self.read_at(search_start, search_size as usize)?;

        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if &buf[i..i + 4] == EndOfCentralDirectory::SIGNATURE {
                let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;

                if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                    let eocd = EndOfCentralDirectory::from_bytes(
                        &buf[i..i + EndOfCentralDirectory::SIZE],
                    )?;
                    return Ok(TrailerInfo {
                        eocd,
                        offset: search_start + i as u64,
                    });
                }
            }
        }

        Err(ZipError::format("End of Central Directory not found"))
    }

    /// Read every directory record described by `eocd`.
    ///
    /// Records are returned in directory order. A record whose name repeats an
    /// earlier one is skipped. Directory offsets are assigned as if each
    /// record were rewritten without extra field or comment.
    pub fn read_directory(&mut self, eocd: &EndOfCentralDirectory) -> Result<Vec<ArchiveEntry>> {
        if eocd.is_zip64() {
            return Err(ZipError::Unsupported("ZIP64 archives".into()));
        }
        if !eocd.is_single_disk() {
            return Err(ZipError::Unsupported("archives spanning several disks".into()));
        }
        let cd_end = eocd.cd_offset as u64 + eocd.cd_size as u64;
        if cd_end > self.size {
            return Err(ZipError::format("central directory extends past end of file"));
        }

        // Read the entire Central Directory in one pass
        let cd_data = self.read_at(eocd.cd_offset as u64, eocd.cd_size as usize)?;
        let mut cursor = Cursor::new(cd_data.as_slice());

        let mut entries = Vec::with_capacity(eocd.total_entries as usize);
        let mut seen = HashSet::new();
        let mut directory_offset = 0u64;

        for _ in 0..eocd.total_entries {
            let entry = Self::parse_cdfh(&mut cursor, directory_offset).map_err(|e| match e {
                ZipError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    ZipError::format("central directory shorter than its entry count")
                }
                other => other,
            })?;
            if !seen.insert(entry.name().to_string()) {
                continue;
            }
            directory_offset += entry.directory_record_size();
            entries.push(entry);
        }

        if cursor.position() != cd_data.len() as u64 {
            return Err(ZipError::format("central directory size mismatch"));
        }

        Ok(entries)
    }

    /// Parse a Central Directory File Header from a cursor.
    fn parse_cdfh(cursor: &mut Cursor<&[u8]>, directory_offset: u64) -> Result<ArchiveEntry> {
        // Read and verify the signature (PK\x01\x02)
        if cursor.read_u32::<LittleEndian>()? != CDFH_SIGNATURE {
            return Err(ZipError::format("invalid Central Directory File Header"));
        }

        // Read fixed-size header fields
        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let compressed_size = cursor.read_u32::<LittleEndian>()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;
        let file_comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let lfh_offset = cursor.read_u32::<LittleEndian>()?;

        if flags & 0x0001 != 0 {
            return Err(ZipError::Unsupported("encrypted entries".into()));
        }

        let file_name = cursor.read_fixed_string(file_name_length as usize)?;

        // Skip the extra field and file comment (we don't keep them)
        let skip_to = cursor.position() + extra_field_length as u64 + file_comment_length as u64;
        if skip_to > cursor.get_ref().len() as u64 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        cursor.set_position(skip_to);

        ArchiveEntry::new(
            file_name,
            CompressionMethod::from_u16(compression_method),
            DosDateTime::new(last_mod_time, last_mod_date),
            crc32,
            compressed_size as u64,
            uncompressed_size as u64,
            lfh_offset as u64,
            directory_offset,
        )
    }

    /// Read the Local File Header of `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`ZipError::Format`] if the header signature is wrong.
    pub fn read_local_header(&mut self, entry: &ArchiveEntry) -> Result<LocalHeaderInfo> {
        if entry.header_position() + LFH_SIZE > self.size {
            return Err(ZipError::format(format!(
                "local header of \"{}\" lies past end of file",
                entry.name()
            )));
        }
        self.source.seek_to(entry.header_position())?;
        if self.source.read_u32::<LittleEndian>()? != LFH_SIGNATURE {
            return Err(ZipError::format(format!(
                "invalid Local File Header for \"{}\"",
                entry.name()
            )));
        }

        // Read the variable field lengths from fixed positions in LFH
        self.source.seek_to(entry.header_position() + 26)?;
        let name_length = self.source.read_u16::<LittleEndian>()?;
        let extra_length = self.source.read_u16::<LittleEndian>()?;
        let name = self.source.read_fixed_string(name_length as usize)?;

        Ok(LocalHeaderInfo {
            name,
            name_length,
            extra_length,
        })
    }
}
