//! Scene manifest (`scene.toml`) parsing
//!
//! A manifest describes a scene for the CLI: materials, then nodes in
//! declaration order. Parents are referenced by name and must be declared
//! first. Mesh paths are relative to the manifest's directory.
//!
//! ```toml
//! [[materials]]
//! name = "brick"
//! albedo = [0.8, 0.3, 0.2]
//!
//! [[materials.slots]]
//! name = "albedo"
//! path = "brick.png"
//!
//! [[nodes]]
//! name = "root"
//!
//! [[nodes]]
//! name = "wall"
//! parent = "root"
//! mesh = "wall.obj"
//! material = "brick"
//! translation = [0.0, 1.0, 0.0]
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use glam::{Mat4, Quat, Vec3};
use hashbrown::HashMap;
use ovo_common::formats::{BodyType, CollisionSource, HullType};
use serde::Deserialize;

use crate::mesh::obj::load_obj;
use crate::scene::{
    LightRecord, LightType, LodLevel, MaterialRecord, MeshRecord, NodeId, NodeKind, PhysicsData,
    Scene, TextureSlot,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneManifest {
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialEntry {
    pub name: String,
    #[serde(default = "default_albedo")]
    pub albedo: [f32; 3],
    #[serde(default)]
    pub emission: [f32; 3],
    #[serde(default = "default_roughness")]
    pub roughness: f32,
    #[serde(default)]
    pub metallic: f32,
    #[serde(default = "default_one")]
    pub alpha: f32,
    #[serde(default)]
    pub slots: Vec<SlotEntry>,
}

fn default_albedo() -> [f32; 3] {
    [0.8; 3]
}

fn default_roughness() -> f32 {
    0.5
}

fn default_one() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotEntry {
    pub name: String,
    pub path: String,
    /// Overrides `embed_textures` for this slot.
    pub embed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindEntry {
    Empty,
    Mesh,
    Light,
    Bone,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    pub name: String,
    /// Inferred from `mesh` / `light` when absent.
    pub kind: Option<KindEntry>,
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Quaternion, `[x, y, z, w]`.
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    /// OBJ file for mesh nodes.
    pub mesh: Option<String>,
    /// Authored LOD chain, finest first (OBJ files).
    #[serde(default)]
    pub lods: Vec<String>,
    pub material: Option<String>,
    pub light: Option<LightEntry>,
    pub physics: Option<PhysicsEntry>,
}

fn default_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_scale() -> [f32; 3] {
    [1.0; 3]
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKindEntry {
    Point,
    Directional,
    Spot,
    Area,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightEntry {
    #[serde(rename = "type")]
    pub light_type: LightKindEntry,
    #[serde(default = "default_white")]
    pub color: [f32; 3],
    #[serde(default = "default_one")]
    pub intensity: f32,
    #[serde(default = "default_range")]
    pub range: f32,
    #[serde(default = "default_direction")]
    pub direction: [f32; 3],
    #[serde(default = "default_cutoff")]
    pub cutoff: f32,
    #[serde(default = "default_one")]
    pub exponent: f32,
    #[serde(default)]
    pub cast_shadows: bool,
    #[serde(default)]
    pub volumetric: bool,
}

fn default_white() -> [f32; 3] {
    [1.0; 3]
}

fn default_range() -> f32 {
    10.0
}

fn default_direction() -> [f32; 3] {
    [0.0, 0.0, -1.0]
}

fn default_cutoff() -> f32 {
    30.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicsEntry {
    #[serde(default)]
    pub dynamic: bool,
    /// sphere, box, capsule, convex, original, custom, concave
    #[serde(default = "default_hull")]
    pub hull: String,
    pub mass: Option<f32>,
    pub friction: Option<f32>,
    pub bounciness: Option<f32>,
    #[serde(default)]
    pub continuous_collision: bool,
    /// Collide with this LOD level instead of the base mesh.
    pub collision_lod: Option<u32>,
}

fn default_hull() -> String {
    "box".to_string()
}

fn parse_hull(name: &str) -> Result<HullType> {
    Ok(match name {
        "sphere" => HullType::Sphere,
        "box" => HullType::Box,
        "capsule" => HullType::Capsule,
        "convex" => HullType::Convex,
        "original" => HullType::Original,
        "custom" => HullType::Custom,
        "concave" => HullType::Concave,
        other => bail!("Unknown hull type '{other}'"),
    })
}

impl MaterialEntry {
    fn to_record(&self) -> MaterialRecord {
        let mut m = MaterialRecord::new(&self.name);
        m.albedo = Vec3::from_array(self.albedo);
        m.emission = Vec3::from_array(self.emission);
        m.roughness = self.roughness;
        m.metallic = self.metallic;
        m.alpha = self.alpha;
        m.slots = self
            .slots
            .iter()
            .map(|s| TextureSlot {
                embed: s.embed,
                ..TextureSlot::new(&s.name, &s.path)
            })
            .collect();
        m
    }
}

impl LightEntry {
    fn to_record(&self) -> LightRecord {
        LightRecord {
            light_type: match self.light_type {
                LightKindEntry::Point => LightType::Point,
                LightKindEntry::Directional => LightType::Directional,
                LightKindEntry::Spot => LightType::Spot,
                LightKindEntry::Area => LightType::Area,
            },
            color: Vec3::from_array(self.color),
            intensity: self.intensity,
            range: self.range,
            direction: Vec3::from_array(self.direction),
            cutoff_degrees: self.cutoff,
            spot_exponent: self.exponent,
            cast_shadows: self.cast_shadows,
            volumetric: self.volumetric,
        }
    }
}

impl PhysicsEntry {
    fn to_data(&self) -> Result<PhysicsData> {
        let mut p = PhysicsData {
            body_type: if self.dynamic {
                BodyType::Dynamic
            } else {
                BodyType::Static
            },
            hull_type: parse_hull(&self.hull)?,
            continuous_collision: self.continuous_collision,
            ..Default::default()
        };
        if let Some(mass) = self.mass {
            p.mass = mass;
        }
        if let Some(friction) = self.friction {
            p.static_friction = friction;
            p.dynamic_friction = friction;
        }
        if let Some(bounciness) = self.bounciness {
            p.bounciness = bounciness;
        }
        if let Some(level) = self.collision_lod {
            p.collision = CollisionSource::Lod(level);
        }
        Ok(p)
    }
}

impl NodeEntry {
    fn kind(&self) -> NodeKind {
        match self.kind {
            Some(KindEntry::Empty) => NodeKind::Empty,
            Some(KindEntry::Mesh) => NodeKind::Mesh,
            Some(KindEntry::Light) => NodeKind::Light,
            Some(KindEntry::Bone) => NodeKind::Bone,
            None if self.mesh.is_some() => NodeKind::Mesh,
            None if self.light.is_some() => NodeKind::Light,
            None => NodeKind::Empty,
        }
    }

    fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_array(self.rotation).normalize(),
            Vec3::from_array(self.translation),
        )
    }
}

/// Load a manifest and everything it references into a [`Scene`].
pub fn load_manifest(path: &Path) -> Result<Scene> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    parse_manifest(&text, base_dir)
        .with_context(|| format!("Failed to load manifest: {}", path.display()))
}

/// Build a scene from manifest text; mesh paths resolve against `base_dir`.
pub fn parse_manifest(text: &str, base_dir: &Path) -> Result<Scene> {
    let manifest: SceneManifest = toml::from_str(text).context("Invalid manifest TOML")?;
    let mut scene = Scene::new();

    for material in &manifest.materials {
        if scene.material(&material.name).is_some() {
            bail!("Material '{}' declared twice", material.name);
        }
        scene.add_material(material.to_record());
    }

    let mut ids: HashMap<&str, NodeId> = HashMap::new();
    for entry in &manifest.nodes {
        if ids.contains_key(entry.name.as_str()) {
            bail!("Node '{}' declared twice", entry.name);
        }
        let parent = match &entry.parent {
            Some(name) => Some(*ids.get(name.as_str()).with_context(|| {
                format!("Node '{}': parent '{name}' must be declared before it", entry.name)
            })?),
            None => None,
        };

        let kind = entry.kind();
        let id = scene.add_node(&entry.name, kind, entry.transform(), parent);
        match kind {
            NodeKind::Mesh => {
                if let Some(mesh) = &entry.mesh {
                    scene.meshes.insert(id, load_mesh(entry, mesh, base_dir)?);
                }
            }
            NodeKind::Light => {
                if let Some(light) = &entry.light {
                    scene.lights.insert(id, light.to_record());
                }
            }
            _ => {}
        }
        ids.insert(entry.name.as_str(), id);
    }

    tracing::debug!(
        "Manifest: {} nodes, {} meshes, {} lights, {} materials",
        scene.nodes.len(),
        scene.meshes.len(),
        scene.lights.len(),
        scene.materials.len()
    );
    Ok(scene)
}

fn load_mesh(entry: &NodeEntry, mesh: &str, base_dir: &Path) -> Result<MeshRecord> {
    let geometry = load_obj(&base_dir.join(mesh))?;
    let mut lods = Vec::with_capacity(entry.lods.len());
    for path in &entry.lods {
        let geometry = load_obj(&base_dir.join(path))?;
        lods.push(LodLevel {
            target_triangles: geometry.triangle_count() as u32,
            error: 0.0,
            geometry,
        });
    }
    Ok(MeshRecord {
        geometry,
        material: entry.material.clone(),
        physics: entry.physics.as_ref().map(PhysicsEntry::to_data).transpose()?,
        lods,
    })
}
