//! OVO file header
//!
//! # Layout
//! ```text
//! 0x00: magic          [u8; 4] = "OVO\0"
//! 0x04: version        u32
//! 0x08: chunk_count    u32
//! 0x0C: node_count     u32
//! 0x10: material_count u32
//! 0x14: texture_count  u32
//! ```

use crate::error::{FormatError, FormatResult};

/// Magic bytes at the start of every OVO file.
pub const OVO_MAGIC: [u8; 4] = *b"OVO\0";

/// The only format version this crate reads and writes.
pub const OVO_VERSION: u32 = 9;

/// OVO file header (24 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvoFileHeader {
    pub version: u32,
    pub chunk_count: u32,
    pub node_count: u32,
    pub material_count: u32,
    pub texture_count: u32,
}

impl Default for OvoFileHeader {
    fn default() -> Self {
        Self {
            version: OVO_VERSION,
            chunk_count: 0,
            node_count: 0,
            material_count: 0,
            texture_count: 0,
        }
    }
}

impl OvoFileHeader {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&OVO_MAGIC);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.chunk_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.node_count.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.material_count.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.texture_count.to_le_bytes());
        bytes
    }

    /// Parse and validate a header (magic + version).
    ///
    /// A short buffer is reported at offset 0, where the header starts.
    pub fn parse(bytes: &[u8]) -> FormatResult<Self> {
        if bytes.len() < Self::SIZE {
            return Err(FormatError::malformed(
                0,
                format!("file header truncated ({} of {} bytes)", bytes.len(), Self::SIZE),
            ));
        }
        let word = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[at..at + 4]);
            u32::from_le_bytes(b)
        };

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != OVO_MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }
        let version = word(4);
        if version != OVO_VERSION {
            return Err(FormatError::UnknownVersion {
                found: version,
                supported: OVO_VERSION,
            });
        }
        Ok(Self {
            version,
            chunk_count: word(8),
            node_count: word(12),
            material_count: word(16),
            texture_count: word(20),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        let header = OvoFileHeader::default();
        assert_eq!(header.to_bytes().len(), OvoFileHeader::SIZE);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = OvoFileHeader {
            chunk_count: 12,
            node_count: 4,
            material_count: 2,
            texture_count: 3,
            ..Default::default()
        };
        let parsed = OvoFileHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = OvoFileHeader::default().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            OvoFileHeader::parse(&bytes),
            Err(FormatError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_unknown_version() {
        let mut bytes = OvoFileHeader::default().to_bytes();
        bytes[4..8].copy_from_slice(&8u32.to_le_bytes());
        assert!(matches!(
            OvoFileHeader::parse(&bytes),
            Err(FormatError::UnknownVersion { found: 8, .. })
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = OvoFileHeader::default().to_bytes();
        assert!(matches!(
            OvoFileHeader::parse(&bytes[..10]),
            Err(FormatError::Malformed { offset: 0, .. })
        ));
    }
}
