//! Error types for archive operations.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ZipError>;

/// Errors produced while opening, mutating or reading an archive.
#[derive(Error, Debug)]
pub enum ZipError {
    /// The file does not follow the ZIP layout (bad signature, size mismatch, ...).
    #[error("Invalid ZIP archive: {0}")]
    Format(String),

    /// The archive uses a feature this library does not handle.
    #[error("Unsupported ZIP archive: {0}")]
    Unsupported(String),

    /// An entry's payload failed verification.
    #[error("Corrupt entry \"{name}\": {reason}")]
    Corrupt { name: String, reason: String },

    /// A mutating call was made on a read-only handle.
    #[error("Archive is opened read-only")]
    ReadOnly,

    /// The entry is not (or no longer) a member of this archive.
    #[error("Entry \"{0}\" does not exist in this archive")]
    NotMember(String),

    /// The entry name does not fit in a 16-bit length field.
    #[error("Entry name too long: {0} bytes")]
    NameTooLong(usize),

    /// A size or offset does not fit in the 32-bit fields of the format.
    #[error("Value exceeds the 32-bit limit of the ZIP format: {0}")]
    TooLarge(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZipError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ZipError::Format(msg.into())
    }

    pub(crate) fn corrupt(name: &str, reason: impl Into<String>) -> Self {
        ZipError::Corrupt {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that only affect a single entry's payload.
    pub fn is_corruption(&self) -> bool {
        matches!(self, ZipError::Corrupt { .. })
    }
}
