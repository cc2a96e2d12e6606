//! OVO binary scene format
//!
//! A file is a 24-byte [`OvoFileHeader`] followed by a flat sequence of
//! chunks (see [`chunk`]). Node-introducing chunks (Node, Bone, Light, Mesh)
//! appear in depth-first pre-order; every node references its parent by the
//! index of an earlier node. Textures and materials precede their first use.
//!
//! Every record implements `encode()` producing a chunk payload and
//! `decode(payload, .., base)` where `base` is the absolute offset of the
//! payload, used for error reporting.

pub mod chunk;
pub mod cursor;
pub mod header;
pub mod light;
pub mod material;
pub mod mesh;
pub mod node;
pub mod physics;
pub mod texture;

pub use chunk::*;
pub use cursor::{NONE_PLACEHOLDER, PayloadReader, PayloadWriter};
pub use header::*;
pub use light::*;
pub use material::*;
pub use mesh::*;
pub use node::*;
pub use physics::*;
pub use texture::*;
