use byteorder::{LittleEndian, WriteBytesExt};
use chrono::NaiveDateTime;
use std::io::Write;

use crate::error::{Result, ZipError};
use crate::io::BinaryWrite;

use super::structures::*;

/// One member of an archive.
///
/// The metadata (name, compression, timestamp, checksum and sizes) never
/// changes once the entry exists. The two placement fields, the offset of the
/// local header in the file and the offset of the directory record relative to
/// the start of the central directory, are owned by the archive and only move
/// when the archive relocates the entry or compacts its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    name: String,
    compression: CompressionMethod,
    modified: DosDateTime,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    header_position: u64,
    directory_offset: u64,
}

impl ArchiveEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        compression: CompressionMethod,
        modified: DosDateTime,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        header_position: u64,
        directory_offset: u64,
    ) -> Result<Self> {
        if name.len() > u16::MAX as usize {
            return Err(ZipError::NameTooLong(name.len()));
        }
        Ok(Self {
            name,
            compression,
            modified,
            crc32,
            compressed_size: u32::try_from(compressed_size)
                .map_err(|_| ZipError::TooLarge(compressed_size))?,
            uncompressed_size: u32::try_from(uncompressed_size)
                .map_err(|_| ZipError::TooLarge(uncompressed_size))?,
            header_position,
            directory_offset,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Modification time as a calendar value, if the stored date is valid.
    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        self.modified.to_naive()
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        self.modified.date_parts()
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        self.modified.time_parts()
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_size as u64
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size as u64
    }

    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Offset of the local file header.
    pub fn header_position(&self) -> u64 {
        self.header_position
    }

    /// Offset of this entry's record within the central directory.
    pub fn directory_offset(&self) -> u64 {
        self.directory_offset
    }

    /// Offset of the first payload byte.
    pub fn payload_position(&self) -> u64 {
        self.header_position + LFH_SIZE + self.name.len() as u64
    }

    /// Bytes occupied by the local header plus payload.
    pub fn total_size(&self) -> u64 {
        LFH_SIZE + self.name.len() as u64 + self.compressed_size as u64
    }

    /// Bytes occupied by this entry's central directory record.
    pub fn directory_record_size(&self) -> u64 {
        CDFH_MIN_SIZE + self.name.len() as u64
    }

    /// End of the local header plus payload.
    pub fn end_position(&self) -> u64 {
        self.header_position + self.total_size()
    }

    pub(crate) fn set_header_position(&mut self, position: u64) {
        self.header_position = position;
    }

    pub(crate) fn set_directory_offset(&mut self, offset: u64) {
        self.directory_offset = offset;
    }

    fn header_position_u32(&self) -> Result<u32> {
        u32::try_from(self.header_position).map_err(|_| ZipError::TooLarge(self.header_position))
    }

    /// Write the local file header (without payload).
    pub(crate) fn write_local_header<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(ZIP_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(self.compression.as_u16())?;
        out.write_u16::<LittleEndian>(self.modified.time)?;
        out.write_u16::<LittleEndian>(self.modified.date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_fixed_string(&self.name, self.name.len())?;
        Ok(())
    }

    /// Write this entry's central directory record.
    pub(crate) fn write_directory_record<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let position = self.header_position_u32()?;
        out.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(ZIP_VERSION)?;
        out.write_u16::<LittleEndian>(ZIP_VERSION)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(self.compression.as_u16())?;
        out.write_u16::<LittleEndian>(self.modified.time)?;
        out.write_u16::<LittleEndian>(self.modified.date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(self.name.len() as u16)?;
        out.write_u16::<LittleEndian>(0)?; // extra field
        out.write_u16::<LittleEndian>(0)?; // comment
        out.write_u16::<LittleEndian>(0)?; // disk number
        out.write_u16::<LittleEndian>(CDFH_INTERNAL_ATTRS)?;
        out.write_u32::<LittleEndian>(CDFH_EXTERNAL_ATTRS)?;
        out.write_u32::<LittleEndian>(position)?;
        out.write_fixed_string(&self.name, self.name.len())?;
        Ok(())
    }
}
