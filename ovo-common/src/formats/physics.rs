//! Physics record
//!
//! Attached to the mesh node named by `owner`; written after that mesh's
//! LOD chunks.
//!
//! # Layout
//! ```text
//! owner               u32
//! body_type           u8 (0 static, 1 dynamic)
//! continuous          u8
//! collide_with_bodies u8
//! hull_type           u8 (0..=7)
//! mass_center         vec3
//! mass, static_friction, dynamic_friction,
//! bounciness, linear_damping, angular_damping   f32 × 6
//! collision_source    u8 (0 base mesh, 1 lod, 2 hulls)
//!   1: level u32
//!   2: hull_count u32, then per hull:
//!      vertex_count u32, face_count u32, centroid vec3,
//!      vertices vec3 × n, faces u32 × 3 × n
//! ```

use glam::Vec3;

use super::cursor::{PayloadReader, PayloadWriter};
use crate::error::{FormatError, FormatResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    #[default]
    Static,
    Dynamic,
}

/// Collision shape used by the physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum HullType {
    #[default]
    Undefined = 0,
    Sphere = 1,
    Box = 2,
    Capsule = 3,
    Convex = 4,
    Original = 5,
    Custom = 6,
    Concave = 7,
}

impl HullType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => HullType::Undefined,
            1 => HullType::Sphere,
            2 => HullType::Box,
            3 => HullType::Capsule,
            4 => HullType::Convex,
            5 => HullType::Original,
            6 => HullType::Custom,
            7 => HullType::Concave,
            _ => return None,
        })
    }

    /// Shapes built from mesh geometry rather than an analytic primitive.
    pub fn uses_geometry(self) -> bool {
        matches!(self, HullType::Convex | HullType::Custom | HullType::Concave)
    }
}

/// Proxy collision hull.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hull {
    pub centroid: Vec3,
    pub vertices: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum CollisionSource {
    #[default]
    BaseMesh,
    /// 1-based LOD level of the owning mesh.
    Lod(u32),
    Hulls(Vec<Hull>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsChunk {
    pub owner: u32,
    pub body_type: BodyType,
    pub continuous_collision: bool,
    pub collide_with_bodies: bool,
    pub hull_type: HullType,
    pub mass_center: Vec3,
    pub mass: f32,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub bounciness: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub collision: CollisionSource,
}

impl PhysicsChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.u32(self.owner)
            .u8(match self.body_type {
                BodyType::Static => 0,
                BodyType::Dynamic => 1,
            })
            .bool(self.continuous_collision)
            .bool(self.collide_with_bodies)
            .u8(self.hull_type as u8)
            .vec3(self.mass_center)
            .f32(self.mass)
            .f32(self.static_friction)
            .f32(self.dynamic_friction)
            .f32(self.bounciness)
            .f32(self.linear_damping)
            .f32(self.angular_damping);

        match &self.collision {
            CollisionSource::BaseMesh => {
                w.u8(0);
            }
            CollisionSource::Lod(level) => {
                w.u8(1).u32(*level);
            }
            CollisionSource::Hulls(hulls) => {
                w.u8(2).u32(hulls.len() as u32);
                for hull in hulls {
                    w.u32(hull.vertices.len() as u32)
                        .u32(hull.faces.len() as u32)
                        .vec3(hull.centroid);
                    for v in &hull.vertices {
                        w.vec3(*v);
                    }
                    for f in &hull.faces {
                        w.u32(f[0]).u32(f[1]).u32(f[2]);
                    }
                }
            }
        }
        w.finish()
    }

    pub fn decode(payload: &[u8], base: u64) -> FormatResult<Self> {
        let mut r = PayloadReader::new(payload, base);
        let owner = r.u32("physics owner")?;

        let at = r.offset();
        let body_type = match r.u8("body type")? {
            0 => BodyType::Static,
            1 => BodyType::Dynamic,
            other => {
                return Err(FormatError::malformed(at, format!("body type {other}")));
            }
        };
        let continuous_collision = r.bool("continuous collision")?;
        let collide_with_bodies = r.bool("collide with bodies")?;
        let at = r.offset();
        let code = r.u8("hull type")?;
        let hull_type = HullType::from_code(code)
            .ok_or_else(|| FormatError::malformed(at, format!("hull type {code}")))?;
        let mass_center = r.vec3("mass center")?;
        let mass = r.f32("mass")?;
        let static_friction = r.f32("static friction")?;
        let dynamic_friction = r.f32("dynamic friction")?;
        let bounciness = r.f32("bounciness")?;
        let linear_damping = r.f32("linear damping")?;
        let angular_damping = r.f32("angular damping")?;

        let at = r.offset();
        let collision = match r.u8("collision source")? {
            0 => CollisionSource::BaseMesh,
            1 => CollisionSource::Lod(r.u32("collision lod level")?),
            2 => {
                let count = r.count(20, "hull count")?;
                let mut hulls = Vec::with_capacity(count);
                for _ in 0..count {
                    hulls.push(read_hull(&mut r)?);
                }
                CollisionSource::Hulls(hulls)
            }
            other => {
                return Err(FormatError::malformed(
                    at,
                    format!("collision source {other}"),
                ));
            }
        };
        r.finish("physics")?;

        Ok(Self {
            owner,
            body_type,
            continuous_collision,
            collide_with_bodies,
            hull_type,
            mass_center,
            mass,
            static_friction,
            dynamic_friction,
            bounciness,
            linear_damping,
            angular_damping,
            collision,
        })
    }
}

fn read_hull(r: &mut PayloadReader<'_>) -> FormatResult<Hull> {
    let vertex_count = r.u32("hull vertex count")? as usize;
    let face_count = r.u32("hull face count")? as usize;
    let centroid = r.vec3("hull centroid")?;
    if vertex_count.saturating_mul(12).saturating_add(face_count.saturating_mul(12)) > r.remaining() {
        return Err(r.error("hull geometry exceeds payload"));
    }
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(r.vec3("hull vertex")?);
    }
    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let at = r.offset();
        let f = [r.u32("hull index")?, r.u32("hull index")?, r.u32("hull index")?];
        if f.iter().any(|&i| i as usize >= vertex_count) {
            return Err(FormatError::malformed(at, "hull face index out of range"));
        }
        faces.push(f);
    }
    Ok(Hull {
        centroid,
        vertices,
        faces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(collision: CollisionSource) -> PhysicsChunk {
        PhysicsChunk {
            owner: 1,
            body_type: BodyType::Dynamic,
            continuous_collision: true,
            collide_with_bodies: true,
            hull_type: HullType::Convex,
            mass_center: Vec3::new(0.0, 0.5, 0.0),
            mass: 2.0,
            static_friction: 0.5,
            dynamic_friction: 0.4,
            bounciness: 0.1,
            linear_damping: 0.04,
            angular_damping: 0.1,
            collision,
        }
    }

    #[test]
    fn test_physics_roundtrip_sources() {
        let hull = Hull {
            centroid: Vec3::ZERO,
            vertices: vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::ZERO],
            faces: vec![[0, 1, 2], [0, 2, 3]],
        };
        for source in [
            CollisionSource::BaseMesh,
            CollisionSource::Lod(2),
            CollisionSource::Hulls(vec![hull]),
        ] {
            let chunk = sample(source);
            assert_eq!(PhysicsChunk::decode(&chunk.encode(), 0).unwrap(), chunk);
        }
    }

    #[test]
    fn test_bad_hull_type_rejected() {
        let mut bytes = sample(CollisionSource::BaseMesh).encode();
        bytes[7] = 9;
        let err = PhysicsChunk::decode(&bytes, 100).unwrap_err();
        assert_eq!(err.offset(), Some(107));
    }

    #[test]
    fn test_geometry_hull_types() {
        assert!(HullType::Convex.uses_geometry());
        assert!(HullType::Concave.uses_geometry());
        assert!(!HullType::Sphere.uses_geometry());
    }
}
