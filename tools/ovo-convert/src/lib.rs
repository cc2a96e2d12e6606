//! ovo-convert library
//!
//! Exports abstract scene graphs to OVO chunk files and imports them back.
//! Hosts implement [`SceneProvider`] and [`TextureProvider`] (or use the owned
//! [`Scene`] and [`FsTextureProvider`]) and call [`export_scene`];
//! [`import_scene`] rebuilds an owned [`Scene`].

pub mod config;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod light;
pub mod manifest;
pub mod material;
pub mod mesh;
pub mod report;
pub mod scene;
pub mod texture;

pub use config::OvoConfig;
pub use error::{ExportError, ImportError};
pub use exporter::{ExportStats, Exported, export_scene, export_to_file};
pub use importer::{Imported, TextureSink, discard_textures, import_file, import_scene};
pub use report::{Report, Warning};
pub use scene::{
    LightRecord, LightType, LodLevel, MaterialRecord, MeshRecord, NodeId, NodeKind, PhysicsData,
    Scene, SceneNode, SceneProvider, TextureAsset, TextureSlot,
};
pub use texture::{FsTextureProvider, MemoryTextureProvider, SourceImage, TextureProvider};
