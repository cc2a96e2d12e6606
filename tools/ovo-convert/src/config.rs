//! Conversion options shared by export and import.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Options recognised by [`export_scene`](crate::export_scene) and
/// [`import_scene`](crate::import_scene).
///
/// Loadable from TOML; missing keys take their default.
///
/// ```toml
/// use_legacy_compression = true
/// lod_levels = 3
/// lod_error_threshold = 0.05
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OvoConfig {
    /// Write mesh payloads. Excluded meshes become empty nodes.
    pub include_meshes: bool,
    /// Write light payloads. Excluded lights become empty nodes.
    pub include_lights: bool,
    /// Block-compress embedded textures. Off stores raw RGBA8.
    pub compress_textures: bool,
    /// Compress with DXT1 (opaque) / DXT5 (alpha) instead of BC7, with BC5
    /// for normal maps.
    pub use_legacy_compression: bool,
    /// Store textures flipped vertically (export) and flip them back (import).
    pub flip_textures_vertically: bool,
    /// Number of LOD levels to generate for meshes without an authored chain.
    pub lod_levels: u32,
    /// Stop simplifying a level once the next collapse would exceed this
    /// error, in mesh units. `0` disables the check.
    pub lod_error_threshold: f32,
    /// Embed texture pixels instead of writing path-only references.
    pub embed_textures: bool,
    /// Triangle target factor applied per LOD level.
    pub lod_reduction: f32,
    /// Meshes with fewer triangles than this get no generated LODs.
    pub lod_face_threshold: u32,
    /// Generate a simplified collision hull of at most this many triangles
    /// for geometry-based physics shapes that collide with the base mesh.
    pub physics_proxy_triangles: Option<u32>,
    /// Treat unsupported light/material sub-kinds on import as fatal.
    pub strict: bool,
}

impl Default for OvoConfig {
    fn default() -> Self {
        Self {
            include_meshes: true,
            include_lights: true,
            compress_textures: true,
            use_legacy_compression: true,
            flip_textures_vertically: true,
            lod_levels: 0,
            lod_error_threshold: 0.0,
            embed_textures: true,
            lod_reduction: 0.5,
            lod_face_threshold: 0,
            physics_proxy_triangles: None,
            strict: false,
        }
    }
}

impl OvoConfig {
    /// Load a config file. Unknown keys are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Reject values the LOD generator cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.lod_reduction > 0.0 && self.lod_reduction < 1.0) {
            return Err(format!(
                "lod_reduction must be in (0, 1), got {}",
                self.lod_reduction
            ));
        }
        if !(self.lod_error_threshold >= 0.0) {
            return Err(format!(
                "lod_error_threshold must be >= 0, got {}",
                self.lod_error_threshold
            ));
        }
        if self.physics_proxy_triangles == Some(0) {
            return Err("physics_proxy_triangles must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(OvoConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: OvoConfig = toml::from_str("lod_levels = 2\nstrict = true\n").unwrap();
        assert_eq!(config.lod_levels, 2);
        assert!(config.strict);
        assert!(config.include_meshes);
        assert!(config.compress_textures && config.use_legacy_compression);
        assert_eq!(config.lod_reduction, 0.5);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<OvoConfig>("lod_level = 2").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_reduction = OvoConfig {
            lod_reduction: 1.0,
            ..Default::default()
        };
        assert!(bad_reduction.validate().is_err());

        let bad_threshold = OvoConfig {
            lod_error_threshold: -1.0,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let nan_threshold = OvoConfig {
            lod_error_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(nan_threshold.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ovo.toml");
        std::fs::write(&path, "use_legacy_compression = false\nlod_reduction = 0.25\n").unwrap();
        let config = OvoConfig::load(&path).unwrap();
        assert!(!config.use_legacy_compression);
        assert_eq!(config.lod_reduction, 0.25);

        std::fs::write(&path, "lod_reduction = 2.0\n").unwrap();
        assert!(OvoConfig::load(&path).is_err());
    }
}
