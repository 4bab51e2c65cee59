use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use std::io::{Cursor, Write};
use std::time::SystemTime;

use crate::error::{Result, ZipError};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Version written to "version made by" and "version needed to extract".
pub const ZIP_VERSION: u16 = 20;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: u32 = 0x04034b50;
pub const LFH_SIZE: u64 = 30;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: u32 = 0x02014b50;
pub const CDFH_MIN_SIZE: u64 = 46;

/// Internal attribute word written to every directory record (text file bit).
pub const CDFH_INTERNAL_ATTRS: u16 = 1;
/// External attribute word written to every directory record (MS-DOS archive bit).
pub const CDFH_EXTERNAL_ATTRS: u32 = 32;

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIGNATURE_U32: u32 = 0x06054b50;
    pub const SIZE: usize = 22;

    /// Trailer for a single-disk archive with no comment.
    pub fn new(entries: u16, cd_offset: u32, cd_size: u32) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZipError::format("truncated End of Central Directory"));
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            return Err(ZipError::format("bad End of Central Directory signature"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(Self::SIGNATURE_U32)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }

    /// True when the directory is not split across several disks.
    pub fn is_single_disk(&self) -> bool {
        self.disk_number == self.disk_with_cd && self.disk_entries == self.total_entries
    }
}

/// MS-DOS packed modification time and date.
///
/// Time: 5-bit hour, 6-bit minute, 5-bit seconds/2.
/// Date: 7-bit years since 1980, 4-bit month, 5-bit day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    pub fn new(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// Current local wall-clock time.
    pub fn now() -> Self {
        Self::from_local(Local::now())
    }

    pub fn from_local(dt: DateTime<Local>) -> Self {
        Self::from_naive(&dt.naive_local())
    }

    /// Encode a local timestamp, clamping years outside 1980..=2107.
    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        if dt.year() < 1980 {
            return Self::new(0, (1 << 5) | 1);
        }
        if dt.year() > 2107 {
            return Self::new((23 << 11) | (59 << 5) | 29, (127 << 9) | (12 << 5) | 31);
        }
        let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 >> 1);
        let date = (((dt.year() - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        Self { time, date }
    }

    /// Encode a file system timestamp in local time.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_local(time.into())
    }

    /// Parse modification date to (year, month, day)
    pub fn date_parts(&self) -> (u16, u8, u8) {
        let day = (self.date & 0x1F) as u8;
        let month = ((self.date >> 5) & 0x0F) as u8;
        let year = ((self.date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn time_parts(&self) -> (u8, u8, u8) {
        let second = ((self.time & 0x1F) * 2) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let hour = ((self.time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Decode into a calendar timestamp, or `None` if the packed value is not
    /// a valid date.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        let (year, month, day) = self.date_parts();
        let (hour, minute, second) = self.time_parts();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            minute as u32,
            second as u32,
        )
    }
}
