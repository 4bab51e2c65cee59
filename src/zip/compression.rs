//! Payload compression for new entries.
//!
//! Entries are compressed with raw DEFLATE (no zlib wrapper) into a buffer
//! the size of the input. When the compressor cannot finish inside that
//! buffer the payload is stored as-is, so compression never grows an entry.

use flate2::{Compress, Compression, FlushCompress, Status};

use super::structures::CompressionMethod;

/// Compression level used unless the archive options say otherwise.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 7;

/// Result of preparing one payload for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionInfo {
    pub compression: CompressionMethod,
    /// CRC32 of the uncompressed bytes.
    pub crc32: u32,
    /// Bytes as they are written after the local header.
    pub data: Vec<u8>,
    pub uncompressed_size: u64,
}

impl CompressionInfo {
    pub fn compressed_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// CRC32 of `data`, computed with a fresh hasher on every call.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Deflate `input` at `level`, falling back to storing it when deflate does
/// not make it strictly smaller.
pub fn compress(input: Vec<u8>, level: u32) -> CompressionInfo {
    let crc32 = crc32(&input);
    let uncompressed_size = input.len() as u64;

    let mut compressor = Compress::new(Compression::new(level.min(9)), false);
    let mut output = vec![0u8; input.len()];
    let deflated = matches!(
        compressor.compress(&input, &mut output, FlushCompress::Finish),
        Ok(Status::StreamEnd)
    ) && compressor.total_out() < uncompressed_size;

    if deflated {
        output.truncate(compressor.total_out() as usize);
        CompressionInfo {
            compression: CompressionMethod::Deflate,
            crc32,
            data: output,
            uncompressed_size,
        }
    } else {
        CompressionInfo {
            compression: CompressionMethod::Stored,
            crc32,
            data: input,
            uncompressed_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn test_compressible_payload_is_deflated() {
        let info = compress(vec![b'A'; 100], DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(info.compression, CompressionMethod::Deflate);
        assert!(info.compressed_size() < 100);
        assert_eq!(info.uncompressed_size, 100);
        assert_eq!(info.crc32, crc32fast::hash(&[b'A'; 100]));
    }

    #[test]
    fn test_random_payload_is_stored() {
        let mut data = vec![0u8; 50];
        rand::thread_rng().fill_bytes(&mut data);

        let info = compress(data.clone(), DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(info.compression, CompressionMethod::Stored);
        assert_eq!(info.compressed_size(), 50);
        assert_eq!(info.data, data);
        assert_eq!(info.crc32, crc32(&data));
    }

    #[test]
    fn test_empty_payload_is_stored() {
        let info = compress(Vec::new(), DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(info.compression, CompressionMethod::Stored);
        assert_eq!(info.compressed_size(), 0);
        assert_eq!(info.crc32, 0);
    }

    #[test]
    fn test_deflate_output_is_raw() {
        let info = compress(vec![0u8; 4096], DEFAULT_COMPRESSION_LEVEL);
        let mut inflater = flate2::Decompress::new(false);
        let mut out = vec![0u8; 4096];
        inflater
            .decompress(&info.data, &mut out, flate2::FlushDecompress::Finish)
            .unwrap();
        assert_eq!(inflater.total_out(), 4096);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_level_zero_still_never_grows() {
        let info = compress(vec![7u8; 300], 0);
        assert!(info.compressed_size() <= 300);
        assert_eq!(info.uncompressed_size, 300);
    }
}
