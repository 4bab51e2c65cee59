use flate2::{Decompress, FlushDecompress};

use crate::error::{Result, ZipError};
use crate::io::{BinaryRead, RandomAccessFile};

use super::compression::crc32;
use super::entry::ArchiveEntry;
use super::structures::CompressionMethod;

/// Reads entry payloads out of an archive file.
pub struct ZipExtractor<'a> {
    source: &'a mut RandomAccessFile,
}

impl<'a> ZipExtractor<'a> {
    pub fn new(source: &'a mut RandomAccessFile) -> Self {
        Self { source }
    }

    /// Read the stored bytes of `entry` without decompressing them.
    pub fn compressed_bytes(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        self.source.seek_to(entry.payload_position())?;
        Ok(self.source.read_byte_array(entry.compressed_size() as usize)?)
    }

    /// Extract file data to memory, verifying size and CRC32.
    pub fn extract_to_memory(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        // Check compression method
        if let CompressionMethod::Unknown(method) = entry.compression() {
            return Err(ZipError::Unsupported(format!(
                "compression method {} for \"{}\"",
                method,
                entry.name()
            )));
        }

        let data = self.compressed_bytes(entry)?;
        let data = match entry.compression() {
            CompressionMethod::Deflate => inflate(entry, &data)?,
            _ => data,
        };

        if data.len() as u64 != entry.uncompressed_size() {
            return Err(ZipError::corrupt(entry.name(), "size mismatch"));
        }
        if crc32(&data) != entry.crc32() {
            return Err(ZipError::corrupt(entry.name(), "CRC32 mismatch"));
        }
        Ok(data)
    }
}

/// Inflate a raw DEFLATE payload into exactly `uncompressed_size` bytes.
fn inflate(entry: &ArchiveEntry, data: &[u8]) -> Result<Vec<u8>> {
    let expected = entry.uncompressed_size() as usize;
    let mut output = vec![0u8; expected];
    let mut inflater = Decompress::new(false);

    inflater
        .decompress(data, &mut output, FlushDecompress::Finish)
        .map_err(|e| ZipError::corrupt(entry.name(), format!("invalid deflate stream: {}", e)))?;

    if inflater.total_out() as usize != expected {
        return Err(ZipError::corrupt(
            entry.name(),
            format!(
                "inflated to {} bytes, expected {}",
                inflater.total_out(),
                expected
            ),
        ));
    }
    Ok(output)
}
