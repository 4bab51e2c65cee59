use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default size of the deferred-write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// A file handle with random access and buffered writes.
///
/// Written bytes are collected in memory and pushed to the file when the
/// buffer fills up, and always before any seek to a different position, any
/// read, any length change and on close. Callers can therefore interleave
/// writes and reads on one handle without seeing stale data.
///
/// The OS file cursor always sits at `position - buffered bytes`.
pub struct RandomAccessFile {
    file: File,
    buffer: Vec<u8>,
    capacity: usize,
    position: u64,
}

impl RandomAccessFile {
    /// Open `path` for reading, or for reading and writing (creating the file
    /// if it does not exist).
    pub fn open(path: &Path, writable: bool) -> io::Result<Self> {
        let file = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        } else {
            File::open(path)?
        };
        Self::with_capacity(file, DEFAULT_BUFFER_SIZE)
    }

    /// Wrap an already opened file, starting at its current cursor.
    pub fn with_capacity(mut file: File, capacity: usize) -> io::Result<Self> {
        let position = file.stream_position()?;
        Ok(Self {
            file,
            buffer: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            position,
        })
    }

    /// Logical position of the next read or write.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length of the file including bytes still waiting in the buffer.
    pub fn len(&self) -> io::Result<u64> {
        let on_disk = self.file.metadata()?.len();
        if self.buffer.is_empty() {
            Ok(on_disk)
        } else {
            Ok(on_disk.max(self.position))
        }
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Move to `position`, flushing pending writes first if it differs from
    /// the current one.
    pub fn seek_to(&mut self, position: u64) -> io::Result<()> {
        if position != self.position {
            self.flush_buffer()?;
            self.file.seek(SeekFrom::Start(position))?;
            self.position = position;
        }
        Ok(())
    }

    /// Truncate or extend the file.
    pub fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.flush_buffer()?;
        self.file.set_len(len)
    }

    /// Push buffered bytes to the file.
    pub fn flush_buffer(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            self.file.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush and release the handle, reporting any error from the final write.
    pub fn close(mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.file.flush()
    }
}

impl Read for RandomAccessFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.flush_buffer()?;
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for RandomAccessFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.buffer.len() + buf.len() > self.capacity {
            self.flush_buffer()?;
        }
        if buf.len() >= self.capacity {
            self.file.write_all(buf)?;
        } else {
            self.buffer.extend_from_slice(buf);
        }
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.file.flush()
    }
}

impl Seek for RandomAccessFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
            SeekFrom::End(d) => self.len()?.checked_add_signed(d),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}

impl Drop for RandomAccessFile {
    fn drop(&mut self) {
        let _ = self.flush_buffer();
    }
}
