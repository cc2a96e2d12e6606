use hashbrown::HashMap;
use ovo_common::dxt::{flip_blocks_vertically, flip_rows_rgba8};
use ovo_common::formats::{SlotMode, TextureChunk};
use ovo_common::TextureCompression;

use super::compress::{
    choose_block_format, choose_modern_format, compress_rgba8, placeholder, to_rgba8,
};
use super::{SourceImage, TextureLoadError, TextureProvider};
use crate::config::OvoConfig;
use crate::report::{Report, Warning};
use crate::scene::TextureSlot;

/// Slot name whose textures are stored as two-channel normal maps (BC5).
pub const NORMAL_SLOT: &str = "normal";

/// Storage family chosen from config and slot, before the pixels are seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Encoding {
    Raw,
    /// DXT1, or DXT5 when alpha is used
    Legacy,
    /// BC7, or BC5 for normal maps
    Modern { normal_map: bool },
}

/// Everything that makes two texture uses interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TextureKey {
    path: String,
    flip: bool,
    encoding: Encoding,
    embed: bool,
}

/// Where a slot's texture ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTexture {
    pub index: u32,
    pub mode: SlotMode,
}

/// Resolves material slots to texture chunks for one export.
///
/// Each distinct key produces exactly one chunk; later uses get the same
/// index. New chunks are queued until [`TextureManager::drain_new`] so the
/// exporter can write them ahead of the material that first needs them.
pub struct TextureManager<'a> {
    provider: &'a dyn TextureProvider,
    compress: bool,
    legacy: bool,
    flip: bool,
    embed_default: bool,
    by_key: HashMap<TextureKey, ResolvedTexture>,
    pending: Vec<TextureChunk>,
    next_index: u32,
}

impl<'a> TextureManager<'a> {
    pub fn new(provider: &'a dyn TextureProvider, config: &OvoConfig) -> Self {
        Self {
            provider,
            compress: config.compress_textures,
            legacy: config.use_legacy_compression,
            flip: config.flip_textures_vertically,
            embed_default: config.embed_textures,
            by_key: HashMap::new(),
            pending: Vec::new(),
            next_index: 0,
        }
    }

    /// Number of distinct textures created so far.
    pub fn texture_count(&self) -> u32 {
        self.next_index
    }

    pub fn resolve(&mut self, slot: &TextureSlot, report: &mut Report) -> ResolvedTexture {
        let encoding = match (self.compress, self.legacy) {
            (false, _) => Encoding::Raw,
            (true, true) => Encoding::Legacy,
            (true, false) => Encoding::Modern {
                normal_map: slot.name == NORMAL_SLOT,
            },
        };
        let key = TextureKey {
            path: self.provider.resolve(&slot.path),
            flip: self.flip,
            encoding,
            embed: slot.embed.unwrap_or(self.embed_default),
        };
        if let Some(&hit) = self.by_key.get(&key) {
            tracing::debug!("Texture '{}' reused as #{}", slot.path, hit.index);
            return hit;
        }

        let index = self.next_index;
        self.next_index += 1;
        let chunk = self.build(index, &slot.path, &key, report);
        let resolved = ResolvedTexture {
            index,
            mode: if chunk.is_embedded() {
                SlotMode::Embedded
            } else {
                SlotMode::Reference
            },
        };
        tracing::debug!(
            "Texture '{}' -> #{index} ({}x{}, {:?}, {} bytes)",
            slot.path,
            chunk.width,
            chunk.height,
            chunk.compression,
            chunk.data.len()
        );
        self.pending.push(chunk);
        self.by_key.insert(key, resolved);
        resolved
    }

    /// Take the chunks created since the last call, in index order.
    pub fn drain_new(&mut self) -> Vec<TextureChunk> {
        std::mem::take(&mut self.pending)
    }

    fn build(&self, index: u32, path: &str, key: &TextureKey, report: &mut Report) -> TextureChunk {
        let loaded = self
            .provider
            .load(path)
            .and_then(|img| match to_rgba8(&img) {
                Some(rgba) => Ok((img, rgba)),
                None => Err(TextureLoadError::Unreadable(format!(
                    "{} bytes do not match {}x{}x{}",
                    img.pixels.len(),
                    img.width,
                    img.height,
                    img.channels
                ))),
            });

        let (image, rgba, is_placeholder) = match loaded {
            Ok((img, rgba)) if img.width > 0 && img.height > 0 => (img, rgba, false),
            Ok(_) => {
                report.push(Warning::TextureResolution {
                    path: path.to_owned(),
                    reason: "empty image".into(),
                });
                let p = placeholder();
                let rgba = p.pixels.clone();
                (p, rgba, true)
            }
            Err(e) => {
                report.push(Warning::TextureResolution {
                    path: path.to_owned(),
                    reason: e.to_string(),
                });
                let p = placeholder();
                let rgba = p.pixels.clone();
                (p, rgba, true)
            }
        };

        let compression = match key.encoding {
            Encoding::Raw => TextureCompression::Rgba8,
            Encoding::Legacy => choose_block_format(image.channels, &rgba),
            Encoding::Modern { normal_map } => choose_modern_format(normal_map),
        };

        let source_path = report.wire_name(&format!("texture {index} path"), path);

        // Placeholders are always embedded so the file stays self-contained
        if !key.embed && !is_placeholder {
            return TextureChunk {
                index,
                source_path,
                width: image.width,
                height: image.height,
                channels: image.channels,
                compression,
                flipped: false,
                placeholder: false,
                data: Vec::new(),
            };
        }

        let data = encode_pixels(&image, rgba, compression, key.flip);
        TextureChunk {
            index,
            source_path,
            width: image.width,
            height: image.height,
            channels: image.channels,
            compression,
            flipped: key.flip,
            placeholder: is_placeholder,
            data,
        }
    }
}

/// Flip (if requested) and compress. Heights that are whole blocks are
/// flipped in the compressed domain, others (and all BC7 data) as pixel
/// rows before padding.
fn encode_pixels(
    image: &SourceImage,
    mut rgba: Vec<u8>,
    compression: TextureCompression,
    flip: bool,
) -> Vec<u8> {
    let (w, h) = (image.width, image.height);
    let block_flip = matches!(
        compression,
        TextureCompression::Dxt1 | TextureCompression::Dxt5 | TextureCompression::Bc5
    );
    if flip && block_flip && h % 4 == 0 {
        let data = compress_rgba8(&rgba, w, h, compression);
        if let Some(flipped) = flip_blocks_vertically(&data, w, h, compression) {
            return flipped;
        }
        // Unreachable for well-sized data; fall back to flipping pixels
        flip_rows_rgba8(&mut rgba, w, h);
        return compress_rgba8(&rgba, w, h, compression);
    }
    if flip {
        flip_rows_rgba8(&mut rgba, w, h);
    }
    compress_rgba8(&rgba, w, h, compression)
}
