//! Abstract scene graph
//!
//! Plain data records exchanged with hosts. The exporter reads a scene
//! through [`SceneProvider`]; the importer produces an owned [`Scene`].
//!
//! Nodes refer to each other by [`NodeId`] only: a child holds a weak
//! back-reference to its parent, the parent lists its children in order.

mod linearize;
mod provider;
mod reconstruct;

pub use linearize::{LinearNode, linearize};
pub use provider::SceneProvider;
pub use reconstruct::SceneBuilder;

use glam::{Mat4, Vec3};
use hashbrown::HashMap;
use ovo_common::formats::{BodyType, CollisionSource, Geometry, HullType, RawChunk};
use ovo_common::TextureCompression;

/// Host-assigned node identifier. Imported scenes use the stream index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Mesh,
    Light,
    Bone,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub local_transform: Mat4,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl SceneNode {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            local_transform: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// One simplified level of a mesh. Level 0 is the mesh itself.
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    pub geometry: Geometry,
    pub target_triangles: u32,
    /// Accumulated geometric error relative to the full mesh.
    pub error: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsData {
    pub body_type: BodyType,
    pub hull_type: HullType,
    pub continuous_collision: bool,
    pub collide_with_bodies: bool,
    pub mass_center: Vec3,
    pub mass: f32,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub bounciness: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub collision: CollisionSource,
}

impl Default for PhysicsData {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            hull_type: HullType::Box,
            continuous_collision: false,
            collide_with_bodies: true,
            mass_center: Vec3::ZERO,
            mass: 1.0,
            static_friction: 0.5,
            dynamic_friction: 0.5,
            bounciness: 0.0,
            linear_damping: 0.04,
            angular_damping: 0.1,
            collision: CollisionSource::BaseMesh,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshRecord {
    pub geometry: Geometry,
    pub material: Option<String>,
    pub physics: Option<PhysicsData>,
    /// Authored LOD chain, finest first. Empty means "generate if configured".
    pub lods: Vec<LodLevel>,
}

impl MeshRecord {
    pub fn vertex_count(&self) -> usize {
        self.geometry.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.geometry.faces.len()
    }
}

/// A named material texture slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    pub name: String,
    /// Path handed to the texture provider.
    pub path: String,
    /// Per-slot override of [`OvoConfig::embed_textures`](crate::OvoConfig).
    pub embed: Option<bool>,
    /// Index into [`Scene::textures`] (set by the importer).
    pub texture: Option<u32>,
}

impl TextureSlot {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            embed: None,
            texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub name: String,
    pub albedo: Vec3,
    pub emission: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub alpha: f32,
    pub slots: Vec<TextureSlot>,
}

impl MaterialRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            albedo: Vec3::splat(0.8),
            emission: Vec3::ZERO,
            roughness: 0.5,
            metallic: 0.0,
            alpha: 1.0,
            slots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    Point,
    Directional,
    Spot,
    /// Representable in hosts but not in the file format.
    Area,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightRecord {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    /// Point and spot falloff distance.
    pub range: f32,
    /// Directional and spot direction, in the node's local space.
    pub direction: Vec3,
    /// Spot cone half-angle in degrees.
    pub cutoff_degrees: f32,
    pub spot_exponent: f32,
    pub cast_shadows: bool,
    pub volumetric: bool,
}

impl Default for LightRecord {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            direction: Vec3::NEG_Z,
            cutoff_degrees: 30.0,
            spot_exponent: 1.0,
            cast_shadows: false,
            volumetric: false,
        }
    }
}

/// Texture as carried in a file. Shared by index across materials.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAsset {
    pub index: u32,
    pub source_path: String,
    pub width: u32,
    pub height: u32,
    /// Channel count of the original source image.
    pub channels: u8,
    /// How the pixels were stored in the file.
    pub compression: TextureCompression,
    /// Stored pixels are still vertically flipped relative to the source.
    pub flipped: bool,
    pub placeholder: bool,
    /// Decoded RGBA8, `width × height × 4` bytes; empty for references.
    pub pixels: Vec<u8>,
}

impl TextureAsset {
    pub fn is_embedded(&self) -> bool {
        !self.pixels.is_empty()
    }
}

/// Owned scene graph.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// All nodes; roots and children in host order.
    pub nodes: Vec<SceneNode>,
    pub meshes: HashMap<NodeId, MeshRecord>,
    pub lights: HashMap<NodeId, LightRecord>,
    /// Materials in first-use order.
    pub materials: Vec<MaterialRecord>,
    /// Textures in file order (index = position).
    pub textures: Vec<TextureAsset>,
    /// Well-formed chunks of unknown kinds, kept for re-export.
    pub extra_chunks: Vec<RawChunk>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.nodes.iter().map(|n| n.id.0 + 1).max().unwrap_or(0))
    }

    /// Append a node under `parent` (or as a root) and return its id.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        transform: Mat4,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = self.next_id();
        let mut node = SceneNode::new(id, name, kind);
        node.local_transform = transform;
        node.parent = parent;
        if let Some(p) = parent {
            if let Some(parent_node) = self.nodes.iter_mut().find(|n| n.id == p) {
                parent_node.children.push(id);
            }
        }
        self.nodes.push(node);
        id
    }

    pub fn add_mesh(
        &mut self,
        name: impl Into<String>,
        transform: Mat4,
        parent: Option<NodeId>,
        mesh: MeshRecord,
    ) -> NodeId {
        let id = self.add_node(name, NodeKind::Mesh, transform, parent);
        self.meshes.insert(id, mesh);
        id
    }

    pub fn add_light(
        &mut self,
        name: impl Into<String>,
        transform: Mat4,
        parent: Option<NodeId>,
        light: LightRecord,
    ) -> NodeId {
        let id = self.add_node(name, NodeKind::Light, transform, parent);
        self.lights.insert(id, light);
        id
    }

    /// Add a material, replacing one with the same name.
    pub fn add_material(&mut self, material: MaterialRecord) {
        match self.materials.iter_mut().find(|m| m.name == material.name) {
            Some(existing) => *existing = material,
            None => self.materials.push(material),
        }
    }

    pub fn material(&self, name: &str) -> Option<&MaterialRecord> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Chain of ancestors of `id`, nearest first. Stops on a cycle.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(p) = current {
            if p == id || out.contains(&p) {
                break;
            }
            out.push(p);
            current = self.node(p).and_then(|n| n.parent);
        }
        out
    }
}
