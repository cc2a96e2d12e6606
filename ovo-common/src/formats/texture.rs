//! Texture record
//!
//! Supports raw RGBA8, S3TC block compression (DXT1 = BC1, DXT5 = BC3) and
//! the BPTC/RGTC pair used for modern targets (BC7 colour, BC5 two-channel
//! normal maps). Width and height are the logical image size; compressed data covers the
//! size rounded up to whole 4×4 blocks.
//!
//! # Layout
//! ```text
//! index       u32
//! source_path string
//! width       u32
//! height      u32
//! channels    u8 (channel count of the source image)
//! compression u8 (0 RGBA8, 1 DXT1, 2 DXT5, 3 BC7, 4 BC5)
//! data_len    u32
//! data        [u8; data_len] (empty unless EMBEDDED)
//! ```

use super::cursor::{PayloadReader, PayloadWriter};
use crate::error::{FormatError, FormatResult};

/// Texture chunk flag: pixel data is embedded.
pub const TEXTURE_EMBEDDED: u16 = 1 << 0;
/// Texture chunk flag: stored image is vertically flipped relative to the source.
pub const TEXTURE_FLIPPED: u16 = 1 << 1;
/// Texture chunk flag: source was missing, data is a placeholder.
pub const TEXTURE_PLACEHOLDER: u16 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureCompression {
    #[default]
    Rgba8,
    Dxt1,
    Dxt5,
    Bc7,
    Bc5,
}

impl TextureCompression {
    pub fn code(self) -> u8 {
        match self {
            TextureCompression::Rgba8 => 0,
            TextureCompression::Dxt1 => 1,
            TextureCompression::Dxt5 => 2,
            TextureCompression::Bc7 => 3,
            TextureCompression::Bc5 => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TextureCompression::Rgba8),
            1 => Some(TextureCompression::Dxt1),
            2 => Some(TextureCompression::Dxt5),
            3 => Some(TextureCompression::Bc7),
            4 => Some(TextureCompression::Bc5),
            _ => None,
        }
    }

    /// Bytes per 4×4 block, `None` for uncompressed data.
    pub fn block_size(self) -> Option<usize> {
        match self {
            TextureCompression::Rgba8 => None,
            TextureCompression::Dxt1 => Some(8),
            TextureCompression::Dxt5 | TextureCompression::Bc7 | TextureCompression::Bc5 => {
                Some(16)
            }
        }
    }

    /// Expected data size for a `width × height` image, `None` if it does
    /// not fit in `usize`.
    pub fn data_size(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        match self.block_size() {
            None => w.checked_mul(h)?.checked_mul(4),
            Some(block) => w.div_ceil(4).checked_mul(h.div_ceil(4))?.checked_mul(block),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureChunk {
    pub index: u32,
    pub source_path: String,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub compression: TextureCompression,
    pub flipped: bool,
    pub placeholder: bool,
    /// Pixel or block data; empty for a reference-only texture.
    pub data: Vec<u8>,
}

impl TextureChunk {
    pub fn is_embedded(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.is_embedded() {
            flags |= TEXTURE_EMBEDDED;
        }
        if self.flipped {
            flags |= TEXTURE_FLIPPED;
        }
        if self.placeholder {
            flags |= TEXTURE_PLACEHOLDER;
        }
        flags
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(32 + self.source_path.len() + self.data.len());
        w.u32(self.index)
            .string(&self.source_path)
            .u32(self.width)
            .u32(self.height)
            .u8(self.channels)
            .u8(self.compression.code())
            .u32(self.data.len() as u32)
            .bytes(&self.data);
        w.finish()
    }

    pub fn decode(payload: &[u8], flags: u16, base: u64) -> FormatResult<Self> {
        let mut r = PayloadReader::new(payload, base);
        let index = r.u32("texture index")?;
        let source_path = r.string("texture path")?;
        let width = r.u32("texture width")?;
        let height = r.u32("texture height")?;
        let channels = r.u8("texture channels")?;
        let at = r.offset();
        let code = r.u8("texture compression")?;
        let compression = TextureCompression::from_code(code)
            .ok_or_else(|| FormatError::malformed(at, format!("compression code {code}")))?;

        let at = r.offset();
        let data_len = r.u32("texture data length")? as usize;
        let embedded = flags & TEXTURE_EMBEDDED != 0;
        let expected = if embedded {
            compression.data_size(width, height).ok_or_else(|| {
                let reason = format!("texture {index} size {width}x{height} overflows");
                FormatError::malformed(at, reason)
            })?
        } else {
            0
        };
        if data_len != expected {
            return Err(FormatError::malformed(
                at,
                format!(
                    "texture {index} ({width}x{height} {compression:?}) has {data_len} data bytes, expected {expected}"
                ),
            ));
        }
        let data = r.take(data_len, "texture data")?.to_vec();
        r.finish("texture")?;

        Ok(Self {
            index,
            source_path,
            width,
            height,
            channels,
            compression,
            flipped: flags & TEXTURE_FLIPPED != 0,
            placeholder: flags & TEXTURE_PLACEHOLDER != 0,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_size() {
        assert_eq!(TextureCompression::Rgba8.data_size(10, 10), Some(400));
        // 10×10 pads to 12×12 = 3×3 blocks
        assert_eq!(TextureCompression::Dxt1.data_size(10, 10), Some(9 * 8));
        assert_eq!(TextureCompression::Dxt5.data_size(4, 4), Some(16));
        assert_eq!(TextureCompression::Bc7.data_size(5, 4), Some(32));
        assert_eq!(TextureCompression::Bc5.data_size(4, 4), Some(16));
    }

    #[test]
    fn test_codes() {
        for c in [
            TextureCompression::Rgba8,
            TextureCompression::Dxt1,
            TextureCompression::Dxt5,
            TextureCompression::Bc7,
            TextureCompression::Bc5,
        ] {
            assert_eq!(TextureCompression::from_code(c.code()), Some(c));
        }
        assert_eq!(TextureCompression::from_code(5), None);
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        // 2^31 × 2^31 RGBA8 overflows usize even on 64-bit targets
        let mut payload = PayloadWriter::new();
        payload
            .u32(0)
            .string("huge.png")
            .u32(1 << 31)
            .u32(1 << 31)
            .u8(4)
            .u8(TextureCompression::Rgba8.code())
            .u32(0);
        let err = TextureChunk::decode(&payload.finish(), TEXTURE_EMBEDDED, 0).unwrap_err();
        assert!(
            matches!(err, FormatError::Malformed { ref reason, .. } if reason.contains("overflows")),
            "{err}"
        );
    }

    #[test]
    fn test_texture_roundtrip() {
        let tex = TextureChunk {
            index: 3,
            source_path: "textures/brick.png".into(),
            width: 4,
            height: 4,
            channels: 3,
            compression: TextureCompression::Dxt1,
            flipped: true,
            placeholder: false,
            data: vec![7; 8],
        };
        let decoded = TextureChunk::decode(&tex.encode(), tex.flags(), 0).unwrap();
        assert_eq!(decoded, tex);
        assert_eq!(tex.flags(), TEXTURE_EMBEDDED | TEXTURE_FLIPPED);
    }

    #[test]
    fn test_reference_only() {
        let tex = TextureChunk {
            index: 0,
            source_path: "a.png".into(),
            width: 64,
            height: 64,
            channels: 4,
            compression: TextureCompression::Rgba8,
            flipped: false,
            placeholder: false,
            data: Vec::new(),
        };
        assert_eq!(tex.flags(), 0);
        assert_eq!(TextureChunk::decode(&tex.encode(), 0, 0).unwrap(), tex);
    }

    #[test]
    fn test_wrong_data_length_rejected() {
        let tex = TextureChunk {
            index: 0,
            source_path: "a.png".into(),
            width: 2,
            height: 2,
            channels: 4,
            compression: TextureCompression::Rgba8,
            flipped: false,
            placeholder: false,
            data: vec![0; 12],
        };
        assert!(TextureChunk::decode(&tex.encode(), tex.flags(), 0).is_err());
    }
}
