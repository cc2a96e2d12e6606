//! Scene → OVO byte stream.
//!
//! One export is a single linear pass over the linearized hierarchy. The
//! only parallel step is mesh preparation (bounds, LOD chains, proxy hulls),
//! which runs up front on the rayon pool and is consumed in traversal order.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::Path;

use hashbrown::HashSet;
use ovo_common::formats::{
    ChunkKind, LodChunk, MeshChunk, NodeHeader, OvoFileHeader, PhysicsChunk, write_chunk,
};
use rayon::prelude::*;

use crate::config::OvoConfig;
use crate::error::ExportError;
use crate::light::encode_light;
use crate::material::encode_material;
use crate::mesh::{PreparedMesh, prepare_mesh};
use crate::report::{Report, Warning};
use crate::scene::{
    LinearNode, MaterialRecord, MeshRecord, NodeKind, SceneNode, SceneProvider, linearize,
};
use crate::texture::{TextureManager, TextureProvider};

/// Counts of what was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub chunks: u32,
    pub nodes: u32,
    pub meshes: u32,
    pub lights: u32,
    pub materials: u32,
    pub textures: u32,
    pub lod_levels: u32,
    pub physics: u32,
    pub extra_chunks: u32,
}

#[derive(Debug, Clone)]
pub struct Exported {
    pub bytes: Vec<u8>,
    pub report: Report,
    pub stats: ExportStats,
}

/// What a node is written as, after config exclusions.
enum Payload<'a> {
    Empty,
    Bone,
    Light(&'a crate::scene::LightRecord),
    Mesh(&'a MeshRecord),
}

/// Resolve each node's payload, demoting excluded kinds to empty nodes.
fn resolve_payloads<'a>(
    provider: &'a dyn SceneProvider,
    order: &[LinearNode],
    config: &OvoConfig,
    report: &mut Report,
) -> Result<Vec<Payload<'a>>, ExportError> {
    let nodes = provider.nodes();
    let mut out = Vec::with_capacity(order.len());
    for ln in order {
        let node = &nodes[ln.source];
        let missing = || {
            ExportError::MissingPayload {
                node: node.name.clone(),
                kind: node.kind,
            }
            .at_node(ln.index, &node.name)
        };
        let payload = match node.kind {
            NodeKind::Empty => Payload::Empty,
            NodeKind::Bone => Payload::Bone,
            NodeKind::Mesh | NodeKind::Light
                if (node.kind == NodeKind::Mesh && !config.include_meshes)
                    || (node.kind == NodeKind::Light && !config.include_lights) =>
            {
                report.push(Warning::PayloadExcluded {
                    node: node.name.clone(),
                    kind: node.kind,
                });
                Payload::Empty
            }
            NodeKind::Mesh => Payload::Mesh(provider.mesh(node.id).ok_or_else(missing)?),
            NodeKind::Light => Payload::Light(provider.light(node.id).ok_or_else(missing)?),
        };
        out.push(payload);
    }
    Ok(out)
}

/// Body writer that counts chunks.
struct ChunkSink {
    body: Vec<u8>,
    chunks: u32,
}

impl ChunkSink {
    fn write(&mut self, kind: ChunkKind, flags: u16, payload: &[u8]) -> Result<(), ExportError> {
        write_chunk(&mut self.body, kind, flags, payload)?;
        self.chunks += 1;
        Ok(())
    }
}

fn precision_warnings(report: &mut Report, context: &str, issues: Vec<ovo_common::PackingIssue>) {
    for issue in &issues {
        report.push(Warning::precision(context, issue));
    }
}

/// Encode a whole scene.
///
/// Fails without partial output on the first fatal error; node-level errors
/// carry the failing node's index and name.
pub fn export_scene(
    provider: &dyn SceneProvider,
    textures: &dyn TextureProvider,
    config: &OvoConfig,
) -> Result<Exported, ExportError> {
    config.validate().map_err(ExportError::InvalidConfig)?;

    let nodes = provider.nodes();
    let order = linearize(nodes)?;
    let mut report = Report::new();
    let payloads = resolve_payloads(provider, &order, config, &mut report)?;

    // Prepare meshes in parallel; keep traversal order for determinism
    let jobs: Vec<(usize, &MeshRecord)> = payloads
        .iter()
        .enumerate()
        .filter_map(|(i, p)| match p {
            Payload::Mesh(mesh) => Some((i, *mesh)),
            _ => None,
        })
        .collect();
    let results: Vec<Result<PreparedMesh, ExportError>> = jobs
        .par_iter()
        .map(|&(i, mesh)| {
            let node = &nodes[order[i].source];
            prepare_mesh(&node.name, mesh, config).map_err(|e| e.at_node(order[i].index, &node.name))
        })
        .collect();
    let mut prepared = Vec::with_capacity(results.len());
    for result in results {
        prepared.push(result?);
    }
    let mut prepared = prepared.into_iter();

    let mut sink = ChunkSink {
        body: Vec::new(),
        chunks: 0,
    };
    let mut stats = ExportStats::default();
    let mut texture_manager = TextureManager::new(textures, config);
    let mut written_materials: HashSet<String> = HashSet::new();

    for (ln, payload) in order.iter().zip(&payloads) {
        let node = &nodes[ln.source];
        let header = NodeHeader {
            name: report.wire_name(&format!("node {}", ln.index), &node.name),
            parent: ln.parent,
            child_count: ln.child_count,
            transform: node.local_transform,
        };
        stats.nodes += 1;

        let written = match payload {
            Payload::Empty => sink.write(ChunkKind::Node, 0, &header.encode()),
            Payload::Bone => sink.write(ChunkKind::Bone, 0, &header.encode()),
            Payload::Light(light) => {
                stats.lights += 1;
                encode_light(header, light, &mut report)
                    .and_then(|chunk| sink.write(ChunkKind::Light, 0, &chunk.encode()))
            }
            Payload::Mesh(mesh) => match prepared.next() {
                Some(prep) => {
                    stats.meshes += 1;
                    write_mesh(
                        &mut sink,
                        &mut stats,
                        MeshWrite {
                            provider,
                            index: ln.index,
                            node,
                            header,
                            mesh,
                            prepared: prep,
                        },
                        &mut texture_manager,
                        &mut written_materials,
                        &mut report,
                    )
                }
                None => Err(ExportError::MissingPayload {
                    node: node.name.clone(),
                    kind: NodeKind::Mesh,
                }),
            },
        };
        written.map_err(|e| e.at_node(ln.index, &node.name))?;
    }

    // Materials no written mesh uses still belong to the scene
    for material in provider.materials() {
        if written_materials.insert(material.name.clone()) {
            write_material(&mut sink, material, &mut texture_manager, &mut report)?;
        }
    }

    for extra in provider.extra_chunks() {
        sink.write(extra.kind, extra.flags, &extra.payload)?;
        stats.extra_chunks += 1;
    }

    stats.chunks = sink.chunks;
    stats.textures = texture_manager.texture_count();
    stats.materials = written_materials.len() as u32;
    let header = OvoFileHeader {
        chunk_count: sink.chunks,
        node_count: stats.nodes,
        material_count: stats.materials,
        texture_count: stats.textures,
        ..Default::default()
    };

    let mut bytes = Vec::with_capacity(OvoFileHeader::SIZE + sink.body.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&sink.body);

    tracing::info!(
        "Exported {} nodes ({} meshes, {} lights), {} materials, {} textures, {} bytes",
        stats.nodes,
        stats.meshes,
        stats.lights,
        stats.materials,
        stats.textures,
        bytes.len()
    );
    Ok(Exported {
        bytes,
        report,
        stats,
    })
}

struct MeshWrite<'a> {
    provider: &'a dyn SceneProvider,
    index: u32,
    node: &'a SceneNode,
    header: NodeHeader,
    mesh: &'a MeshRecord,
    prepared: PreparedMesh,
}

/// Material (and its new textures) on first use, then mesh, LODs, physics.
fn write_mesh(
    sink: &mut ChunkSink,
    stats: &mut ExportStats,
    job: MeshWrite<'_>,
    textures: &mut TextureManager<'_>,
    written_materials: &mut HashSet<String>,
    report: &mut Report,
) -> Result<(), ExportError> {
    let MeshWrite {
        provider,
        index,
        node,
        header,
        mesh,
        prepared,
    } = job;
    report.append(prepared.report);

    if let Some(name) = &mesh.material {
        if !written_materials.contains(name) {
            let material =
                provider
                    .material(name)
                    .ok_or_else(|| ExportError::UnsupportedMaterialFeature {
                        material: name.clone(),
                        detail: "not defined by the scene".into(),
                    })?;
            write_material(sink, material, textures, report)?;
            written_materials.insert(name.clone());
        }
    }

    let context = format!("mesh '{}'", node.name);
    let material = mesh
        .material
        .as_deref()
        .map(|name| report.wire_name(&format!("{context} material"), name));
    let chunk = MeshChunk {
        node: header,
        material,
        bounding_radius: prepared.bounding_radius,
        bbox_min: prepared.bbox_min,
        bbox_max: prepared.bbox_max,
        lod_count: prepared.lods.len() as u32,
        geometry: mesh.geometry.clone(),
        has_physics: prepared.physics.is_some(),
    };
    let mut issues = Vec::new();
    let payload = chunk.encode(&mut issues);
    precision_warnings(report, &context, issues);
    sink.write(ChunkKind::Mesh, chunk.flags(), &payload)?;

    for (i, lod) in prepared.lods.into_iter().enumerate() {
        let level = i as u32 + 1;
        let chunk = LodChunk {
            owner: index,
            level,
            target_triangles: lod.target_triangles,
            error: lod.error,
            geometry: lod.geometry,
        };
        let mut issues = Vec::new();
        let payload = chunk.encode(&mut issues);
        precision_warnings(report, &format!("{context} LOD {level}"), issues);
        sink.write(ChunkKind::Lod, 0, &payload)?;
        stats.lod_levels += 1;
    }

    if let Some(p) = prepared.physics {
        let chunk = PhysicsChunk {
            owner: index,
            body_type: p.body_type,
            continuous_collision: p.continuous_collision,
            collide_with_bodies: p.collide_with_bodies,
            hull_type: p.hull_type,
            mass_center: p.mass_center,
            mass: p.mass,
            static_friction: p.static_friction,
            dynamic_friction: p.dynamic_friction,
            bounciness: p.bounciness,
            linear_damping: p.linear_damping,
            angular_damping: p.angular_damping,
            collision: p.collision,
        };
        sink.write(ChunkKind::Physics, 0, &chunk.encode())?;
        stats.physics += 1;
    }
    Ok(())
}

/// New textures first, then the material chunk that references them.
fn write_material(
    sink: &mut ChunkSink,
    material: &MaterialRecord,
    textures: &mut TextureManager<'_>,
    report: &mut Report,
) -> Result<(), ExportError> {
    let chunk = encode_material(material, textures, report)?;
    for texture in textures.drain_new() {
        sink.write(ChunkKind::Texture, texture.flags(), &texture.encode())?;
    }
    sink.write(ChunkKind::Material, 0, &chunk.encode())
}

/// Export to `path` through a sibling `.tmp` file, so a failed export never
/// leaves a partial file behind.
pub fn export_to_file(
    path: &Path,
    provider: &dyn SceneProvider,
    textures: &dyn TextureProvider,
    config: &OvoConfig,
) -> Result<Exported, ExportError> {
    let exported = export_scene(provider, textures, config)?;

    let Some(name) = path.file_name() else {
        return Err(ExportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output path has no file name: {}", path.display()),
        )));
    };
    let mut tmp_name = OsString::from(name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = (|| -> std::io::Result<()> {
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&exported.bytes)?;
            f.sync_all()?;
        }

        #[cfg(windows)]
        {
            if path.exists() {
                // Windows rename fails if destination exists.
                fs::remove_file(path)?;
            }
        }

        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    tracing::info!("Wrote {}", path.display());
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightRecord, LightType, Scene, TextureSlot};
    use crate::texture::{MemoryTextureProvider, SourceImage};
    use glam::{Mat4, Vec2, Vec3};
    use ovo_common::formats::{ChunkReader, Geometry, Vertex};

    fn triangle() -> MeshRecord {
        let v = |x: f32, y: f32| Vertex {
            position: Vec3::new(x, y, 0.0),
            normal: Vec3::Z,
            uv: Vec2::new(x, y),
            ..Default::default()
        };
        MeshRecord {
            geometry: Geometry {
                vertices: vec![v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)],
                faces: vec![[0, 1, 2]],
            },
            ..Default::default()
        }
    }

    fn kinds(bytes: &[u8]) -> Vec<ChunkKind> {
        ChunkReader::new(&bytes[OvoFileHeader::SIZE..], OvoFileHeader::SIZE as u64)
            .map(|c| c.unwrap().kind)
            .collect()
    }

    #[test]
    fn test_header_counts() {
        let mut scene = Scene::new();
        let root = scene.add_node("root", NodeKind::Empty, Mat4::IDENTITY, None);
        scene.add_mesh("tri", Mat4::IDENTITY, Some(root), triangle());
        scene.add_light("sun", Mat4::IDENTITY, Some(root), LightRecord::default());

        let out = export_scene(&scene, &MemoryTextureProvider::new(), &OvoConfig::default()).unwrap();
        let header = OvoFileHeader::parse(&out.bytes).unwrap();
        assert_eq!(header.node_count, 3);
        assert_eq!(header.chunk_count, 3);
        assert_eq!(header.material_count, 0);
        assert_eq!(
            kinds(&out.bytes),
            [ChunkKind::Node, ChunkKind::Mesh, ChunkKind::Light]
        );
        assert_eq!(out.stats.meshes, 1);
    }

    #[test]
    fn test_excluded_payload_becomes_empty() {
        let mut scene = Scene::new();
        let lamp = scene.add_light("lamp", Mat4::IDENTITY, None, LightRecord::default());
        scene.add_node("shade", NodeKind::Empty, Mat4::IDENTITY, Some(lamp));
        let config = OvoConfig {
            include_lights: false,
            ..Default::default()
        };

        let out = export_scene(&scene, &MemoryTextureProvider::new(), &config).unwrap();
        assert_eq!(kinds(&out.bytes), [ChunkKind::Node, ChunkKind::Node]);
        assert_eq!(
            out.report.warnings,
            vec![Warning::PayloadExcluded {
                node: "lamp".into(),
                kind: NodeKind::Light,
            }]
        );
    }

    #[test]
    fn test_missing_payload() {
        let mut scene = Scene::new();
        scene.add_node("ghost", NodeKind::Mesh, Mat4::IDENTITY, None);
        let err =
            export_scene(&scene, &MemoryTextureProvider::new(), &OvoConfig::default()).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ExportError::MissingPayload {
                kind: NodeKind::Mesh,
                ..
            }
        ));
        assert!(matches!(err, ExportError::Node { index: 0, .. }));
    }

    #[test]
    fn test_area_light_names_node() {
        let mut scene = Scene::new();
        let root = scene.add_node("root", NodeKind::Empty, Mat4::IDENTITY, None);
        let area = LightRecord {
            light_type: LightType::Area,
            ..Default::default()
        };
        scene.add_light("panel", Mat4::IDENTITY, Some(root), area);

        let err =
            export_scene(&scene, &MemoryTextureProvider::new(), &OvoConfig::default()).unwrap_err();
        match &err {
            ExportError::Node { index, name, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(name, "panel");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            err.root_cause(),
            ExportError::UnsupportedLightType { .. }
        ));
    }

    #[test]
    fn test_undefined_material() {
        let mut scene = Scene::new();
        let mut mesh = triangle();
        mesh.material = Some("nowhere".into());
        scene.add_mesh("tri", Mat4::IDENTITY, None, mesh);
        let err =
            export_scene(&scene, &MemoryTextureProvider::new(), &OvoConfig::default()).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ExportError::UnsupportedMaterialFeature { .. }
        ));
    }

    #[test]
    fn test_unreferenced_material_is_written() {
        let mut scene = Scene::new();
        let mut used = MaterialRecord::new("used");
        used.slots.push(TextureSlot::new("albedo", "a.png"));
        scene.add_material(used);
        let mut spare = MaterialRecord::new("spare");
        spare.slots.push(TextureSlot::new("albedo", "b.png"));
        scene.add_material(spare);
        let mut mesh = triangle();
        mesh.material = Some("used".into());
        scene.add_mesh("tri", Mat4::IDENTITY, None, mesh);

        let provider = MemoryTextureProvider::new()
            .with("a.png", SourceImage::rgba8(1, 1, vec![255; 4]))
            .with("b.png", SourceImage::rgba8(1, 1, vec![0; 4]));
        let out = export_scene(&scene, &provider, &OvoConfig::default()).unwrap();
        assert_eq!(
            kinds(&out.bytes),
            [
                ChunkKind::Texture,
                ChunkKind::Material,
                ChunkKind::Mesh,
                ChunkKind::Texture,
                ChunkKind::Material
            ]
        );
        assert_eq!((out.stats.materials, out.stats.textures), (2, 2));

        // Excluding meshes keeps every material
        let config = OvoConfig {
            include_meshes: false,
            ..Default::default()
        };
        let out = export_scene(&scene, &provider, &config).unwrap();
        let header = OvoFileHeader::parse(&out.bytes).unwrap();
        assert_eq!((header.material_count, header.texture_count), (2, 2));
    }

    #[test]
    fn test_reserved_names_are_escaped() {
        let mut scene = Scene::new();
        scene.add_material(MaterialRecord::new("[none]"));
        let mut mesh = triangle();
        mesh.material = Some("[none]".into());
        scene.add_mesh("[none]", Mat4::IDENTITY, None, mesh);
        scene.add_node("a\0b", NodeKind::Empty, Mat4::IDENTITY, None);

        let out = export_scene(&scene, &MemoryTextureProvider::new(), &OvoConfig::default()).unwrap();
        let imported = crate::import_scene(
            out.bytes.as_slice(),
            &mut crate::discard_textures(),
            &OvoConfig::default(),
        )
        .unwrap();
        let scene = &imported.scene;
        assert_eq!(scene.nodes[0].name, "[none]_");
        assert_eq!(scene.nodes[1].name, "ab");
        let mesh = &scene.meshes[&scene.nodes[0].id];
        assert_eq!(mesh.material.as_deref(), Some("[none]_"));
        assert!(scene.material("[none]_").is_some());
        // node, mesh reference, material name, NUL strip
        assert_eq!(
            out.report
                .count(|w| matches!(w, Warning::NameSanitized { .. })),
            4
        );
    }

    #[test]
    fn test_invalid_config() {
        let config = OvoConfig {
            lod_reduction: 0.0,
            ..Default::default()
        };
        let err = export_scene(&Scene::new(), &MemoryTextureProvider::new(), &config).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfig(_)));
    }

    #[test]
    fn test_export_to_file_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.ovo");

        let mut bad = Scene::new();
        bad.add_node("ghost", NodeKind::Light, Mat4::IDENTITY, None);
        let textures = MemoryTextureProvider::new();
        assert!(export_to_file(&path, &bad, &textures, &OvoConfig::default()).is_err());
        assert!(!path.exists());

        let mut good = Scene::new();
        good.add_mesh("tri", Mat4::IDENTITY, None, triangle());
        let out = export_to_file(&path, &good, &textures, &OvoConfig::default()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), out.bytes);
        assert!(!dir.path().join("scene.ovo.tmp").exists());
    }
}
