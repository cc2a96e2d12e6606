//! Errors raised while reading or writing the OVO wire format.

use std::io;

/// Structural failure while parsing an OVO byte stream.
///
/// Every variant that points into the stream carries the absolute byte
/// offset where the problem was detected.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The stream is corrupt: truncated, over-long or inconsistent.
    #[error("malformed stream at byte {offset}: {reason}")]
    Malformed { offset: u64, reason: String },

    /// The file does not start with the OVO magic bytes.
    #[error("not an OVO file (magic {found:02x?})")]
    BadMagic { found: [u8; 4] },

    /// The file header declares a version this build cannot read.
    #[error("unsupported OVO version {found} (supported: {supported})")]
    UnknownVersion { found: u32, supported: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FormatError {
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Byte offset of the failure, when the error points into the stream.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Malformed { offset, .. } => Some(*offset),
            Self::BadMagic { .. } | Self::UnknownVersion { .. } => Some(0),
            Self::Io(_) => None,
        }
    }
}

pub type FormatResult<T> = Result<T, FormatError>;
