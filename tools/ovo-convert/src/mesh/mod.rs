//! Mesh preparation ahead of encoding
//!
//! Everything here is pure and per-mesh, so the exporter runs it on the
//! rayon pool and collects results in traversal order:
//!
//! - [`simplify`] - quadric edge-collapse
//! - LOD chain generation / validation
//! - physics proxy hulls
//! - [`obj`] - Wavefront OBJ loading for the CLI

mod lod;
pub mod obj;
pub mod simplify;

pub use lod::{generate_chain, validate_chain};

use glam::Vec3;
use hashbrown::HashMap;
use ovo_common::formats::{CollisionSource, Geometry, Hull};

use crate::config::OvoConfig;
use crate::error::ExportError;
use crate::report::{Report, Warning};
use crate::scene::{LodLevel, MeshRecord, PhysicsData};

/// Mesh data derived before the linear write pass.
#[derive(Debug, Clone)]
pub struct PreparedMesh {
    pub bounding_radius: f32,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    /// Authored or generated chain, finest first.
    pub lods: Vec<LodLevel>,
    pub physics: Option<PhysicsData>,
    pub report: Report,
}

fn check_indices(geometry: &Geometry, what: &str) -> Result<(), ExportError> {
    let count = geometry.vertices.len() as u32;
    match geometry.faces.iter().flatten().find(|&&i| i >= count) {
        Some(i) => Err(ExportError::InvalidGeometry {
            reason: format!("{what} references vertex {i}, only {count} exist"),
        }),
        None => Ok(()),
    }
}

/// Compute bounds, resolve the LOD chain and the collision source of one mesh.
pub fn prepare_mesh(
    name: &str,
    mesh: &MeshRecord,
    config: &OvoConfig,
) -> Result<PreparedMesh, ExportError> {
    let mut report = Report::new();
    let base = &mesh.geometry;
    check_indices(base, "base mesh")?;

    let tris = base.triangle_count();
    let lods = if !mesh.lods.is_empty() {
        for (i, lod) in mesh.lods.iter().enumerate() {
            check_indices(&lod.geometry, &format!("LOD {}", i + 1))?;
        }
        validate_chain(tris, &mesh.lods)?;
        mesh.lods.clone()
    } else if config.lod_levels > 0 && tris > 0 && tris >= config.lod_face_threshold as usize {
        let chain = generate_chain(
            base,
            config.lod_levels,
            config.lod_reduction,
            config.lod_error_threshold,
        );
        if (chain.len() as u32) < config.lod_levels {
            report.push(Warning::LodChainTruncated {
                node: name.to_owned(),
                requested: config.lod_levels,
                produced: chain.len() as u32,
            });
        }
        chain
    } else {
        Vec::new()
    };

    let physics = match &mesh.physics {
        Some(p) => Some(prepare_physics(name, p, base, lods.len() as u32, config)?),
        None => None,
    };

    let (bbox_min, bbox_max) = base.bounds();
    Ok(PreparedMesh {
        bounding_radius: base.bounding_radius(),
        bbox_min,
        bbox_max,
        lods,
        physics,
        report,
    })
}

fn prepare_physics(
    name: &str,
    physics: &PhysicsData,
    base: &Geometry,
    lod_count: u32,
    config: &OvoConfig,
) -> Result<PhysicsData, ExportError> {
    let mut out = physics.clone();
    match &physics.collision {
        CollisionSource::Lod(level) if *level == 0 || *level > lod_count => {
            return Err(ExportError::InvalidLodChain {
                reason: format!("physics collides with LOD {level}, chain has {lod_count} levels"),
            });
        }
        CollisionSource::BaseMesh if physics.hull_type.uses_geometry() => {
            if let Some(target) = config.physics_proxy_triangles {
                let hull = proxy_hull(base, target as usize);
                tracing::debug!(
                    "'{name}': proxy hull with {} triangles (from {})",
                    hull.faces.len(),
                    base.triangle_count()
                );
                out.collision = CollisionSource::Hulls(vec![hull]);
            }
        }
        _ => {}
    }
    Ok(out)
}

/// Simplified, position-only copy of `geometry` for collision.
pub fn proxy_hull(geometry: &Geometry, max_triangles: usize) -> Hull {
    let simplified = simplify::simplify(geometry, max_triangles, None).geometry;

    let mut index: HashMap<[u32; 3], u32> = HashMap::new();
    let mut vertices: Vec<Vec3> = Vec::new();
    let remap: Vec<u32> = simplified
        .vertices
        .iter()
        .map(|v| {
            let key = v.position.to_array().map(|c| (c + 0.0).to_bits());
            *index.entry(key).or_insert_with(|| {
                vertices.push(v.position);
                (vertices.len() - 1) as u32
            })
        })
        .collect();
    let faces = simplified
        .faces
        .iter()
        .map(|f| f.map(|i| remap[i as usize]))
        .collect();

    let centroid = if vertices.is_empty() {
        Vec3::ZERO
    } else {
        vertices.iter().copied().sum::<Vec3>() / vertices.len() as f32
    };
    Hull {
        centroid,
        vertices,
        faces,
    }
}
