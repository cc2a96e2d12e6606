//! Mesh and LOD records
//!
//! # Mesh payload (after the node header)
//! ```text
//! material        string ("[none]" = no material)
//! bounding_radius f32
//! bbox_min        vec3
//! bbox_max        vec3
//! lod_count       u32 (LOD chunks that follow for this mesh)
//! vertex_count    u32
//! face_count      u32
//! vertices        [PackedVertex; vertex_count]
//! indices         [u32 × 3; face_count]
//! ```
//!
//! # LOD payload
//! ```text
//! owner            u32 (node index of the mesh)
//! level            u32 (1-based)
//! target_triangles u32
//! error            f32 (accumulated geometric error, mesh units)
//! vertex_count     u32
//! face_count       u32
//! vertices, indices as above
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use super::cursor::{PayloadReader, PayloadWriter};
use super::node::NodeHeader;
use crate::error::{FormatError, FormatResult};
use crate::packing::{
    PackingIssue, pack_normal, pack_tangent, pack_uv, sanitize_position, unpack_normal,
    unpack_tangent, unpack_uv,
};

/// Mesh chunk flag: a physics chunk follows this mesh's LOD chunks.
pub const MESH_HAS_PHYSICS: u16 = 1 << 0;
/// Mesh chunk flag: `lod_count > 0`.
pub const MESH_HAS_LODS: u16 = 1 << 1;

/// Unpacked vertex, as seen by producers and consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    /// xyz direction, w handedness (±1)
    pub tangent: Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            uv: Vec2::ZERO,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
        }
    }
}

/// Wire vertex (24 bytes)
///
/// ```text
/// 0x00: position f32 × 3
/// 0x0C: normal   u32 snorm 10-10-10-2
/// 0x10: uv       u32 f16 × 2
/// 0x14: tangent  u32 snorm 10-10-10-2 (w = handedness)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub normal: u32,
    pub uv: u32,
    pub tangent: u32,
}

impl PackedVertex {
    pub const SIZE: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        for (i, p) in self.position.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&p.to_le_bytes());
        }
        bytes[12..16].copy_from_slice(&self.normal.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.uv.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.tangent.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let raw: PackedVertex = bytemuck::pod_read_unaligned(&bytes[..Self::SIZE]);
        let le_f32 = |v: f32| f32::from_bits(u32::from_le(v.to_bits()));
        Some(Self {
            position: raw.position.map(le_f32),
            normal: u32::from_le(raw.normal),
            uv: u32::from_le(raw.uv),
            tangent: u32::from_le(raw.tangent),
        })
    }
}

impl Vertex {
    /// Quantize to the wire layout, recording every lossy replacement.
    pub fn pack(&self, issues: &mut Vec<PackingIssue>) -> PackedVertex {
        PackedVertex {
            position: sanitize_position(self.position, issues).to_array(),
            normal: pack_normal(self.normal, issues),
            uv: pack_uv(self.uv, issues),
            tangent: pack_tangent(self.tangent, issues),
        }
    }

    pub fn unpack(packed: &PackedVertex) -> Self {
        Self {
            position: Vec3::from_array(packed.position),
            normal: unpack_normal(packed.normal),
            uv: unpack_uv(packed.uv),
            tangent: unpack_tangent(packed.tangent),
        }
    }
}

/// Triangle list geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
}

impl Geometry {
    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    /// Axis-aligned bounds of the vertex positions (zero box when empty).
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut it = self.vertices.iter().map(|v| v.position);
        let Some(first) = it.next() else {
            return (Vec3::ZERO, Vec3::ZERO);
        };
        it.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)))
    }

    /// Largest distance of any vertex from the local origin.
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|v| v.position.length())
            .fold(0.0, f32::max)
    }

    fn write(&self, w: &mut PayloadWriter, issues: &mut Vec<PackingIssue>) {
        w.u32(self.vertices.len() as u32).u32(self.faces.len() as u32);
        for v in &self.vertices {
            w.bytes(&v.pack(issues).to_bytes());
        }
        for face in &self.faces {
            w.u32(face[0]).u32(face[1]).u32(face[2]);
        }
    }

    fn read(r: &mut PayloadReader<'_>) -> FormatResult<Self> {
        let at = r.offset();
        let vertex_count = r.u32("vertex count")? as usize;
        let face_count = r.u32("face count")? as usize;
        let needed = vertex_count
            .checked_mul(PackedVertex::SIZE)
            .and_then(|v| face_count.checked_mul(12).and_then(|f| v.checked_add(f)));
        if needed.is_none_or(|n| n > r.remaining()) {
            return Err(FormatError::malformed(
                at,
                format!("{vertex_count} vertices / {face_count} faces exceed payload"),
            ));
        }

        let vertex_bytes = r.take(vertex_count * PackedVertex::SIZE, "vertices")?;
        let vertices = vertex_bytes
            .chunks_exact(PackedVertex::SIZE)
            .filter_map(PackedVertex::from_bytes)
            .map(|p| Vertex::unpack(&p))
            .collect();

        let mut faces = Vec::with_capacity(face_count);
        for _ in 0..face_count {
            let at = r.offset();
            let face = [r.u32("index")?, r.u32("index")?, r.u32("index")?];
            if face.iter().any(|&i| i as usize >= vertex_count) {
                return Err(FormatError::malformed(
                    at,
                    format!("face {face:?} references past {vertex_count} vertices"),
                ));
            }
            faces.push(face);
        }
        Ok(Self { vertices, faces })
    }
}

/// Mesh node chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshChunk {
    pub node: NodeHeader,
    pub material: Option<String>,
    pub bounding_radius: f32,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    pub lod_count: u32,
    pub geometry: Geometry,
    pub has_physics: bool,
}

impl MeshChunk {
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.has_physics {
            flags |= MESH_HAS_PHYSICS;
        }
        if self.lod_count > 0 {
            flags |= MESH_HAS_LODS;
        }
        flags
    }

    pub fn encode(&self, issues: &mut Vec<PackingIssue>) -> Vec<u8> {
        let mut w = PayloadWriter::with_capacity(
            128 + self.geometry.vertices.len() * PackedVertex::SIZE + self.geometry.faces.len() * 12,
        );
        self.node.write(&mut w);
        w.opt_string(self.material.as_deref())
            .f32(self.bounding_radius)
            .vec3(self.bbox_min)
            .vec3(self.bbox_max)
            .u32(self.lod_count);
        self.geometry.write(&mut w, issues);
        w.finish()
    }

    pub fn decode(payload: &[u8], flags: u16, base: u64) -> FormatResult<Self> {
        let mut r = PayloadReader::new(payload, base);
        let node = NodeHeader::read(&mut r)?;
        let material = r.opt_string("mesh material")?;
        let bounding_radius = r.f32("bounding radius")?;
        let bbox_min = r.vec3("bbox min")?;
        let bbox_max = r.vec3("bbox max")?;
        let lod_at = r.offset();
        let lod_count = r.u32("lod count")?;
        if (lod_count > 0) != (flags & MESH_HAS_LODS != 0) {
            return Err(FormatError::malformed(
                lod_at,
                format!("lod_count {lod_count} disagrees with HAS_LODS flag"),
            ));
        }
        let geometry = Geometry::read(&mut r)?;
        r.finish("mesh")?;
        Ok(Self {
            node,
            material,
            bounding_radius,
            bbox_min,
            bbox_max,
            lod_count,
            geometry,
            has_physics: flags & MESH_HAS_PHYSICS != 0,
        })
    }
}

/// One simplified level of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct LodChunk {
    pub owner: u32,
    pub level: u32,
    pub target_triangles: u32,
    pub error: f32,
    pub geometry: Geometry,
}

impl LodChunk {
    pub fn encode(&self, issues: &mut Vec<PackingIssue>) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.u32(self.owner)
            .u32(self.level)
            .u32(self.target_triangles)
            .f32(self.error);
        self.geometry.write(&mut w, issues);
        w.finish()
    }

    pub fn decode(payload: &[u8], base: u64) -> FormatResult<Self> {
        let mut r = PayloadReader::new(payload, base);
        let owner = r.u32("lod owner")?;
        let level = r.u32("lod level")?;
        let target_triangles = r.u32("lod target")?;
        let error = r.f32("lod error")?;
        let geometry = Geometry::read(&mut r)?;
        r.finish("lod")?;
        Ok(Self {
            owner,
            level,
            target_triangles,
            error,
            geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn triangle() -> Geometry {
        let v = |x: f32, y: f32| Vertex {
            position: Vec3::new(x, y, 0.0),
            normal: Vec3::Z,
            uv: Vec2::new(x, y),
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
        };
        Geometry {
            vertices: vec![v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)],
            faces: vec![[0, 1, 2]],
        }
    }

    fn mesh(geometry: Geometry) -> MeshChunk {
        let (bbox_min, bbox_max) = geometry.bounds();
        MeshChunk {
            node: NodeHeader {
                name: "tri".into(),
                parent: None,
                child_count: 0,
                transform: Mat4::IDENTITY,
            },
            material: Some("mat".into()),
            bounding_radius: geometry.bounding_radius(),
            bbox_min,
            bbox_max,
            lod_count: 0,
            geometry,
            has_physics: false,
        }
    }

    #[test]
    fn test_packed_vertex_size() {
        assert_eq!(std::mem::size_of::<PackedVertex>(), PackedVertex::SIZE);
    }

    #[test]
    fn test_bounds() {
        let g = triangle();
        assert_eq!(g.bounds(), (Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(g.bounding_radius(), 1.0);
        assert_eq!(Geometry::default().bounds(), (Vec3::ZERO, Vec3::ZERO));
    }

    #[test]
    fn test_mesh_decode_matches_within_quantization() {
        let chunk = mesh(triangle());
        let mut issues = Vec::new();
        let bytes = chunk.encode(&mut issues);
        assert!(issues.is_empty());

        let decoded = MeshChunk::decode(&bytes, chunk.flags(), 0).unwrap();
        assert_eq!(decoded.node, chunk.node);
        assert_eq!(decoded.material, chunk.material);
        assert_eq!(decoded.geometry.faces, chunk.geometry.faces);
        for (a, b) in decoded.geometry.vertices.iter().zip(&chunk.geometry.vertices) {
            assert_eq!(a.position, b.position);
            assert!((a.normal - b.normal).length() < 0.005);
            assert!((a.uv - b.uv).length() < 0.001);
            assert_eq!(a.tangent.w, b.tangent.w);
        }
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut g = triangle();
        g.faces[0] = [0, 1, 3];
        let chunk = mesh(g);
        let bytes = chunk.encode(&mut Vec::new());
        assert!(MeshChunk::decode(&bytes, 0, 0).is_err());
    }

    #[test]
    fn test_lod_flag_mismatch_rejected() {
        let chunk = mesh(triangle());
        let bytes = chunk.encode(&mut Vec::new());
        assert!(MeshChunk::decode(&bytes, MESH_HAS_LODS, 0).is_err());
    }

    #[test]
    fn test_lod_roundtrip() {
        let lod = LodChunk {
            owner: 2,
            level: 1,
            target_triangles: 1,
            error: 0.25,
            geometry: triangle(),
        };
        let decoded = LodChunk::decode(&lod.encode(&mut Vec::new()), 0).unwrap();
        assert_eq!(decoded.owner, 2);
        assert_eq!(decoded.level, 1);
        assert_eq!(decoded.error, 0.25);
        assert_eq!(decoded.geometry.faces.len(), 1);
    }

    #[test]
    fn test_truncated_vertices_rejected() {
        let bytes = mesh(triangle()).encode(&mut Vec::new());
        assert!(MeshChunk::decode(&bytes[..bytes.len() - 20], 0, 0).is_err());
    }
}
