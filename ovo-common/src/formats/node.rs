//! Node header shared by every node-introducing chunk.
//!
//! # Layout
//! ```text
//! name       string ("[none]" = unnamed)
//! parent     u32 (index of an earlier node, u32::MAX = root)
//! child_hint u32 (number of direct children that follow)
//! transform  mat4 (local, column-major)
//! ```

use glam::Mat4;

use super::cursor::{PayloadReader, PayloadWriter};
use crate::error::FormatResult;

/// Parent index written for root nodes.
pub const ROOT_PARENT: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeHeader {
    pub name: String,
    pub parent: Option<u32>,
    pub child_count: u32,
    pub transform: Mat4,
}

impl NodeHeader {
    pub fn write(&self, w: &mut PayloadWriter) {
        let name = (!self.name.is_empty()).then_some(self.name.as_str());
        w.opt_string(name)
            .u32(self.parent.unwrap_or(ROOT_PARENT))
            .u32(self.child_count)
            .mat4(&self.transform);
    }

    pub fn read(r: &mut PayloadReader<'_>) -> FormatResult<Self> {
        let name = r.opt_string("node name")?.unwrap_or_default();
        let parent = r.u32("node parent")?;
        let child_count = r.u32("node child count")?;
        let transform = r.mat4("node transform")?;
        Ok(Self {
            name,
            parent: (parent != ROOT_PARENT).then_some(parent),
            child_count,
            transform,
        })
    }

    /// Encode a standalone node chunk payload (Node and Bone kinds).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        self.write(&mut w);
        w.finish()
    }

    pub fn decode(payload: &[u8], base: u64) -> FormatResult<Self> {
        let mut r = PayloadReader::new(payload, base);
        let node = Self::read(&mut r)?;
        r.finish("node")?;
        Ok(node)
    }
}
