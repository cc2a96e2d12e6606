//! Texture sources, compression and per-export deduplication.
//!
//! - [`TextureProvider`] - where pixels come from (filesystem, memory, host,
//!   or the embedded textures of an imported [`Scene`])
//! - [`compress`] - RGBA8 normalization, edge padding, BC1/BC3/BC5/BC7 encoding
//! - [`TextureManager`] - slot → texture index resolution for one export

pub mod compress;
mod manager;

pub use manager::{NORMAL_SLOT, ResolvedTexture, TextureManager};

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use ovo_common::dxt::flip_rows_rgba8;

use crate::scene::{Scene, TextureAsset};

/// Raw pixels handed over by a provider, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// 1 (gray), 2 (gray + alpha), 3 (RGB) or 4 (RGBA)
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl SourceImage {
    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels: 4,
            pixels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextureLoadError {
    #[error("not found")]
    NotFound,
    #[error("unreadable: {0}")]
    Unreadable(String),
}

/// Source of texture pixels, keyed by the path stored in material slots.
pub trait TextureProvider {
    fn load(&self, path: &str) -> Result<SourceImage, TextureLoadError>;

    /// Canonical form of `path` used as the deduplication key.
    fn resolve(&self, path: &str) -> String {
        path.replace('\\', "/")
    }
}

/// Loads textures from disk relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsTextureProvider {
    root: PathBuf,
}

impl FsTextureProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

impl TextureProvider for FsTextureProvider {
    fn load(&self, path: &str) -> Result<SourceImage, TextureLoadError> {
        let full = self.full_path(path);
        if !full.is_file() {
            return Err(TextureLoadError::NotFound);
        }
        let img = image::open(&full).map_err(|e| TextureLoadError::Unreadable(e.to_string()))?;
        let (width, height) = (img.width(), img.height());
        let channels = img.color().channel_count().clamp(1, 4);
        let pixels = match channels {
            1 => img.to_luma8().into_raw(),
            2 => img.to_luma_alpha8().into_raw(),
            3 => img.to_rgb8().into_raw(),
            _ => img.to_rgba8().into_raw(),
        };
        tracing::debug!("Loaded texture {} ({width}x{height}, {channels} ch)", full.display());
        Ok(SourceImage {
            width,
            height,
            channels,
            pixels,
        })
    }

    fn resolve(&self, path: &str) -> String {
        let full = self.full_path(path);
        full.canonicalize()
            .unwrap_or(full)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// In-memory texture table, for tests and hosts that already hold pixels.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextureProvider {
    images: HashMap<String, SourceImage>,
}

impl MemoryTextureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, image: SourceImage) {
        self.images.insert(path.into(), image);
    }

    pub fn with(mut self, path: impl Into<String>, image: SourceImage) -> Self {
        self.insert(path, image);
        self
    }
}

impl TextureProvider for MemoryTextureProvider {
    fn load(&self, path: &str) -> Result<SourceImage, TextureLoadError> {
        self.images
            .get(path)
            .or_else(|| self.images.get(&self.resolve(path)))
            .cloned()
            .ok_or(TextureLoadError::NotFound)
    }
}

/// Serves the embedded textures of an imported scene, so it can be
/// re-exported without the original image files.
///
/// Pixels come back in source orientation with the source channel count.
/// Placeholders and path-only references report [`TextureLoadError::NotFound`].
impl TextureProvider for Scene {
    fn load(&self, path: &str) -> Result<SourceImage, TextureLoadError> {
        let wanted = self.resolve(path);
        let asset = self
            .textures
            .iter()
            .filter(|t| t.is_embedded() && !t.placeholder)
            .find(|t| t.source_path == path || self.resolve(&t.source_path) == wanted)
            .ok_or(TextureLoadError::NotFound)?;
        source_image(asset)
    }
}

fn source_image(asset: &TextureAsset) -> Result<SourceImage, TextureLoadError> {
    let (width, height) = (asset.width, asset.height);
    if asset.pixels.len() != width as usize * height as usize * 4 {
        return Err(TextureLoadError::Unreadable(format!(
            "{} decoded bytes do not match {width}x{height}",
            asset.pixels.len()
        )));
    }
    let mut rgba = asset.pixels.clone();
    if asset.flipped {
        flip_rows_rgba8(&mut rgba, width, height);
    }
    let pixels = match asset.channels {
        1 => rgba.chunks_exact(4).map(|px| px[0]).collect(),
        2 => rgba.chunks_exact(4).flat_map(|px| [px[0], px[3]]).collect(),
        3 => rgba.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect(),
        _ => rgba,
    };
    Ok(SourceImage {
        width,
        height,
        channels: asset.channels.clamp(1, 4),
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovo_common::TextureCompression;

    fn asset(path: &str, pixels: Vec<u8>) -> TextureAsset {
        TextureAsset {
            index: 0,
            source_path: path.into(),
            width: 1,
            height: 2,
            channels: 3,
            compression: TextureCompression::Dxt1,
            flipped: false,
            placeholder: false,
            pixels,
        }
    }

    #[test]
    fn test_scene_provider_serves_embedded_textures() {
        let mut scene = Scene::new();
        let mut flipped = asset("tex/a.png", vec![1, 2, 3, 255, 4, 5, 6, 255]);
        flipped.flipped = true;
        scene.textures.push(flipped);
        let mut missing = asset("gone.png", vec![0; 8]);
        missing.placeholder = true;
        scene.textures.push(missing);
        scene.textures.push(asset("ref.png", Vec::new()));

        let loaded = scene.load("tex\\a.png").unwrap();
        assert_eq!((loaded.width, loaded.height, loaded.channels), (1, 2, 3));
        // Stored rows are un-flipped and alpha is dropped
        assert_eq!(loaded.pixels, vec![4, 5, 6, 1, 2, 3]);

        assert_eq!(scene.load("gone.png"), Err(TextureLoadError::NotFound));
        assert_eq!(scene.load("ref.png"), Err(TextureLoadError::NotFound));
        assert_eq!(scene.load("other.png"), Err(TextureLoadError::NotFound));
    }

    #[test]
    fn test_memory_provider() {
        let provider =
            MemoryTextureProvider::new().with("a/b.png", SourceImage::rgba8(1, 1, vec![1, 2, 3, 4]));
        assert_eq!(provider.load("a/b.png").unwrap().pixels, vec![1, 2, 3, 4]);
        assert_eq!(provider.load("a\\b.png").unwrap().width, 1);
        assert_eq!(provider.load("missing.png"), Err(TextureLoadError::NotFound));
    }

    #[test]
    fn test_fs_provider_loads_png() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        img.save(dir.path().join("tex.png")).unwrap();

        let provider = FsTextureProvider::new(dir.path());
        let loaded = provider.load("tex.png").unwrap();
        assert_eq!((loaded.width, loaded.height, loaded.channels), (3, 2, 3));
        assert_eq!(&loaded.pixels[..3], &[10, 20, 30]);

        assert_eq!(provider.load("nope.png"), Err(TextureLoadError::NotFound));
        assert_eq!(provider.resolve("tex.png"), provider.resolve("./tex.png"));
    }

    #[test]
    fn test_fs_provider_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        let provider = FsTextureProvider::new(dir.path());
        assert!(matches!(
            provider.load("bad.png"),
            Err(TextureLoadError::Unreadable(_))
        ));
    }
}
