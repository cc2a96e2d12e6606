//! Shared wire format for OVO scene files
//!
//! This crate is I/O-free apart from `std::io::Read`/`Write` and is used by:
//! - `ovo-convert` (exporter, importer and the `ovo` CLI)
//!
//! # Modules
//!
//! - [`formats`] - File header, chunk framing and record layouts
//! - [`packing`] - Vertex attribute packing (f32 → snorm10/f16)
//! - [`dxt`] - BC1/BC3 block decoding and compressed-domain flipping
//! - [`error`] - [`FormatError`]

pub mod dxt;
pub mod error;
pub mod formats;
pub mod packing;

pub use error::{FormatError, FormatResult};

// Re-export commonly used packing items
pub use packing::{
    Attribute, HALF_MAX, PackingIssue, f32_to_snorm10, pack_normal, pack_snorm3x10_1x2,
    pack_tangent, pack_uv, snorm10_to_f32, unpack_normal, unpack_snorm3x10_1x2, unpack_tangent,
    unpack_uv,
};

// Re-export commonly used format items
pub use formats::{
    ChunkHeader, ChunkKind, ChunkReader, CollisionSource, Geometry, Hull,
    HullType, LightChunk, LightDecode, LightShape, LodChunk, MaterialChunk, MeshChunk,
    NodeHeader, OVO_MAGIC, OVO_VERSION, OvoFileHeader, PackedVertex, PhysicsChunk, RawChunk,
    SlotMode, SlotRef, TextureChunk, TextureCompression, Vertex, write_chunk,
};
