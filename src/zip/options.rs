use super::allocator::MIN_BLOCK_SHIFT;
use super::compression::DEFAULT_COMPRESSION_LEVEL;
use crate::io::DEFAULT_BUFFER_SIZE;

/// Tunables for opening a [`ZipArchive`](super::ZipArchive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Disable all mutation and skip the repair pass.
    pub read_only: bool,
    /// DEFLATE level for new entries, 0..=9.
    pub compression_level: u32,
    /// log2 of the smallest allocator block.
    pub min_block_shift: u32,
    /// Bytes buffered before writes reach the file.
    pub write_buffer_size: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            min_block_shift: MIN_BLOCK_SHIFT,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn min_block_shift(mut self, shift: u32) -> Self {
        self.min_block_shift = shift;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }
}
