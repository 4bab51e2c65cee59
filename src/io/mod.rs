//! Little-endian binary encoding over byte sources and sinks.
//!
//! Numeric fields go through `byteorder` ([`ReadBytesExt`] / [`WriteBytesExt`]
//! with [`LittleEndian`]). The [`BinaryRead`] and [`BinaryWrite`] extension
//! traits add the remaining primitives used by archive records: booleans,
//! single-byte characters, raw byte arrays and strings (null-terminated or
//! fixed-width).
//!
//! Both traits are implemented for every [`Read`] / [`Write`], so the same
//! codec works over all backing resources:
//!
//! - a buffered stream: [`std::io::BufReader`] over a file or socket
//! - a streaming writer: any [`Write`]
//! - an in-memory buffer: `Vec<u8>` grows on write, `&[u8]` / `Cursor` read from a slice
//! - a random-access file: [`RandomAccessFile`], which defers writes until a
//!   seek, read or close
//!
//! Reading past the end of the data fails with [`std::io::ErrorKind::UnexpectedEof`].

mod random_access;

pub use random_access::{DEFAULT_BUFFER_SIZE, RandomAccessFile};

pub use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use std::io::{self, Read, Write};

/// Reading helpers layered over [`Read`].
pub trait BinaryRead: Read {
    /// Read a boolean stored as one byte; any non-zero value is `true`.
    fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a character stored as a single byte.
    fn read_char(&mut self) -> io::Result<char> {
        Ok(char::from(self.read_u8()?))
    }

    /// Read exactly `len` bytes.
    fn read_byte_array(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut data = vec![0u8; len];
        self.read_exact(&mut data)?;
        Ok(data)
    }

    /// Read bytes up to (and consuming) a zero terminator.
    fn read_cstring(&mut self) -> io::Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => bytes.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a field of exactly `width` bytes, truncating the string at the
    /// first zero byte.
    fn read_fixed_string(&mut self, width: usize) -> io::Result<String> {
        let bytes = self.read_byte_array(width)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl<R: Read + ?Sized> BinaryRead for R {}

/// Writing helpers layered over [`Write`].
pub trait BinaryWrite: Write {
    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Write a character as a single byte. Characters outside Latin-1 are
    /// truncated to their low byte.
    fn write_char(&mut self, c: char) -> io::Result<()> {
        self.write_u8((u32::from(c) & 0xFF) as u8)
    }

    /// Write the string's bytes followed by a zero terminator.
    fn write_cstring(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())?;
        self.write_u8(0)
    }

    /// Write exactly `width` bytes: short strings are padded with zeros, long
    /// strings are truncated without a terminator.
    fn write_fixed_string(&mut self, s: &str, width: usize) -> io::Result<()> {
        let bytes = s.as_bytes();
        let len = bytes.len().min(width);
        self.write_all(&bytes[..len])?;
        for _ in len..width {
            self.write_u8(0)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> BinaryWrite for W {}
