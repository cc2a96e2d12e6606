//! OVO byte stream → scene.
//!
//! Chunks are read lazily in one pass. Node chunks rebuild the hierarchy
//! through [`SceneBuilder`]; payload chunks that reference nodes (LOD,
//! physics) or earlier records (material slots → textures) are checked
//! against what has been read so far. Once the stream ends, the counts
//! declared in the file header and mesh flags must match what was seen.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use hashbrown::HashMap;
use ovo_common::dxt::{decode_to_rgba8, flip_rows_rgba8};
use ovo_common::formats::{
    ChunkKind, ChunkReader, LodChunk, MaterialChunk, MeshChunk, NodeHeader, OvoFileHeader,
    PhysicsChunk, RawChunk, TextureChunk,
};

use crate::config::OvoConfig;
use crate::error::ImportError;
use crate::light::decode_light;
use crate::material::decode_material;
use crate::report::{Report, Warning};
use crate::scene::{LodLevel, MeshRecord, NodeId, NodeKind, PhysicsData, Scene, SceneBuilder, TextureAsset};

/// Receives each decoded texture once the whole stream has validated.
///
/// A stream that fails to import never reaches the sink, so callers that
/// write textures out do not leave partial output behind.
pub trait TextureSink {
    fn texture(&mut self, texture: &TextureAsset);
}

impl<F: FnMut(&TextureAsset)> TextureSink for F {
    fn texture(&mut self, texture: &TextureAsset) {
        self(texture)
    }
}

/// Sink that ignores textures (they are still stored in the scene).
pub fn discard_textures() -> impl TextureSink {
    |_: &TextureAsset| {}
}

#[derive(Debug, Clone)]
pub struct Imported {
    pub scene: Scene,
    pub report: Report,
}

/// What a mesh chunk promised about the chunks that follow it.
#[derive(Debug)]
struct MeshExpect {
    offset: u64,
    lods_declared: u32,
    lods_seen: u32,
    physics_declared: bool,
    physics_seen: bool,
}

struct Importer<'a> {
    config: &'a OvoConfig,
    builder: SceneBuilder,
    report: Report,
    meshes: HashMap<u32, MeshExpect>,
    material_chunks: u32,
}

impl Importer<'_> {
    fn chunk(&mut self, chunk: RawChunk) -> Result<(), ImportError> {
        let base = chunk.payload_offset();
        match chunk.kind {
            ChunkKind::Node | ChunkKind::Bone => {
                let header = NodeHeader::decode(&chunk.payload, base)?;
                let kind = if chunk.kind == ChunkKind::Bone {
                    NodeKind::Bone
                } else {
                    NodeKind::Empty
                };
                self.builder.add_node(&header, kind, chunk.offset, &mut self.report)?;
            }
            ChunkKind::Light => {
                let (header, light) =
                    decode_light(&chunk.payload, chunk.offset, base, self.config, &mut self.report)?;
                let kind = if light.is_some() {
                    NodeKind::Light
                } else {
                    NodeKind::Empty
                };
                let id = self.builder.add_node(&header, kind, chunk.offset, &mut self.report)?;
                if let Some(light) = light {
                    self.builder.scene_mut().lights.insert(id, light);
                }
            }
            ChunkKind::Mesh => self.mesh(&chunk)?,
            ChunkKind::Lod => self.lod(&chunk)?,
            ChunkKind::Physics => self.physics(&chunk)?,
            ChunkKind::Texture => self.texture(&chunk)?,
            ChunkKind::Material => {
                let (material, offsets) = MaterialChunk::decode(&chunk.payload, base)?;
                let scene = self.builder.scene_mut();
                let record =
                    decode_material(material, &offsets, &scene.textures, self.config, &mut self.report)?;
                scene.add_material(record);
                self.material_chunks += 1;
            }
            ChunkKind::Unknown(code) => {
                self.report.push(Warning::UnknownChunk {
                    code,
                    offset: chunk.offset,
                    length: chunk.payload.len(),
                });
                self.builder.scene_mut().extra_chunks.push(chunk);
            }
        }
        Ok(())
    }

    fn mesh(&mut self, chunk: &RawChunk) -> Result<(), ImportError> {
        let mesh = MeshChunk::decode(&chunk.payload, chunk.flags, chunk.payload_offset())?;
        let id = self
            .builder
            .add_node(&mesh.node, NodeKind::Mesh, chunk.offset, &mut self.report)?;
        self.meshes.insert(
            id.0,
            MeshExpect {
                offset: chunk.offset,
                lods_declared: mesh.lod_count,
                lods_seen: 0,
                physics_declared: mesh.has_physics,
                physics_seen: false,
            },
        );
        self.builder.scene_mut().meshes.insert(
            id,
            MeshRecord {
                geometry: mesh.geometry,
                material: mesh.material,
                physics: None,
                lods: Vec::new(),
            },
        );
        Ok(())
    }

    /// The owning mesh's expectations, or a malformed-stream error.
    fn owner(&mut self, owner: u32, what: &str, offset: u64) -> Result<&mut MeshExpect, ImportError> {
        self.meshes.get_mut(&owner).ok_or_else(|| {
            ImportError::malformed(offset, format!("{what} owner {owner} is not a mesh read earlier"))
        })
    }

    fn lod(&mut self, chunk: &RawChunk) -> Result<(), ImportError> {
        let lod = LodChunk::decode(&chunk.payload, chunk.payload_offset())?;
        let offset = chunk.offset;
        let expect = self.owner(lod.owner, "LOD", offset)?;
        if expect.physics_seen {
            return Err(ImportError::malformed(offset, "LOD chunk after its mesh's physics chunk"));
        }
        if lod.level != expect.lods_seen + 1 || lod.level > expect.lods_declared {
            return Err(ImportError::malformed(
                offset,
                format!(
                    "LOD level {} out of order (mesh {} declares {}, {} read)",
                    lod.level, lod.owner, expect.lods_declared, expect.lods_seen
                ),
            ));
        }
        expect.lods_seen += 1;

        if let Some(mesh) = self.builder.scene_mut().meshes.get_mut(&NodeId(lod.owner)) {
            mesh.lods.push(LodLevel {
                geometry: lod.geometry,
                target_triangles: lod.target_triangles,
                error: lod.error,
            });
        }
        Ok(())
    }

    fn physics(&mut self, chunk: &RawChunk) -> Result<(), ImportError> {
        let p = PhysicsChunk::decode(&chunk.payload, chunk.payload_offset())?;
        let offset = chunk.offset;
        let expect = self.owner(p.owner, "physics", offset)?;
        if !expect.physics_declared || expect.physics_seen {
            return Err(ImportError::malformed(
                offset,
                format!("unexpected physics chunk for mesh {}", p.owner),
            ));
        }
        expect.physics_seen = true;

        if let Some(mesh) = self.builder.scene_mut().meshes.get_mut(&NodeId(p.owner)) {
            mesh.physics = Some(PhysicsData {
                body_type: p.body_type,
                hull_type: p.hull_type,
                continuous_collision: p.continuous_collision,
                collide_with_bodies: p.collide_with_bodies,
                mass_center: p.mass_center,
                mass: p.mass,
                static_friction: p.static_friction,
                dynamic_friction: p.dynamic_friction,
                bounciness: p.bounciness,
                linear_damping: p.linear_damping,
                angular_damping: p.angular_damping,
                collision: p.collision,
            });
        }
        Ok(())
    }

    fn texture(&mut self, chunk: &RawChunk) -> Result<(), ImportError> {
        let base = chunk.payload_offset();
        let tex = TextureChunk::decode(&chunk.payload, chunk.flags, base)?;
        let expected = self.builder.scene_mut().textures.len() as u32;
        if tex.index != expected {
            return Err(ImportError::malformed(
                chunk.offset,
                format!("texture index {} out of sequence, expected {expected}", tex.index),
            ));
        }

        let mut flipped = tex.flipped;
        let pixels = if tex.is_embedded() {
            let mut rgba = decode_to_rgba8(&tex.data, tex.width, tex.height, tex.compression)
                .map_err(|e| ImportError::malformed(base, e.to_string()))?;
            if flipped && self.config.flip_textures_vertically {
                flip_rows_rgba8(&mut rgba, tex.width, tex.height);
                flipped = false;
            }
            rgba
        } else {
            Vec::new()
        };

        let asset = TextureAsset {
            index: tex.index,
            source_path: tex.source_path,
            width: tex.width,
            height: tex.height,
            channels: tex.channels,
            compression: tex.compression,
            flipped,
            placeholder: tex.placeholder,
            pixels,
        };
        tracing::debug!(
            "Texture #{} '{}' ({}x{}, {:?})",
            asset.index,
            asset.source_path,
            asset.width,
            asset.height,
            asset.compression
        );
        self.builder.scene_mut().textures.push(asset);
        Ok(())
    }

    fn finish(self, header: &OvoFileHeader, chunks: u32, end: u64) -> Result<Imported, ImportError> {
        let mut owners: Vec<_> = self.meshes.iter().collect();
        owners.sort_by_key(|(owner, _)| **owner);
        for (owner, expect) in owners {
            if expect.lods_seen != expect.lods_declared {
                return Err(ImportError::malformed(
                    expect.offset,
                    format!(
                        "mesh {owner} declares {} LOD levels, stream has {}",
                        expect.lods_declared, expect.lods_seen
                    ),
                ));
            }
            if expect.physics_declared && !expect.physics_seen {
                return Err(ImportError::malformed(
                    expect.offset,
                    format!("mesh {owner} declares physics, stream has none"),
                ));
            }
        }

        let mut builder = self.builder;
        let textures = builder.scene_mut().textures.len() as u32;
        let counts = [
            ("chunks", header.chunk_count, chunks),
            ("nodes", header.node_count, builder.node_count()),
            ("materials", header.material_count, self.material_chunks),
            ("textures", header.texture_count, textures),
        ];
        for (what, declared, seen) in counts {
            if declared != seen {
                return Err(ImportError::malformed(
                    end,
                    format!("header declares {declared} {what}, stream has {seen}"),
                ));
            }
        }

        let scene = builder.finish()?;
        tracing::info!(
            "Imported {} nodes, {} materials, {} textures",
            scene.nodes.len(),
            scene.materials.len(),
            scene.textures.len()
        );
        Ok(Imported {
            scene,
            report: self.report,
        })
    }
}

/// Decode a whole stream. Nothing partial is returned on error, and the
/// sink only sees textures of a stream that imported successfully.
pub fn import_scene<R: Read>(
    mut reader: R,
    sink: &mut dyn TextureSink,
    config: &OvoConfig,
) -> Result<Imported, ImportError> {
    let mut buf = [0u8; OvoFileHeader::SIZE];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ImportError::malformed(0, "truncated file header"),
        _ => ImportError::Io(e),
    })?;
    let header = OvoFileHeader::parse(&buf)?;

    let mut importer = Importer {
        config,
        builder: SceneBuilder::new(),
        report: Report::new(),
        meshes: HashMap::new(),
        material_chunks: 0,
    };
    let mut chunks = ChunkReader::new(reader, OvoFileHeader::SIZE as u64);
    let mut count = 0u32;
    for chunk in chunks.by_ref() {
        importer.chunk(chunk?)?;
        count += 1;
    }
    let end = chunks.offset();
    let imported = importer.finish(&header, count, end)?;
    for texture in &imported.scene.textures {
        sink.texture(texture);
    }
    Ok(imported)
}

/// Import from a file.
pub fn import_file(
    path: &Path,
    sink: &mut dyn TextureSink,
    config: &OvoConfig,
) -> Result<Imported, ImportError> {
    let reader = BufReader::new(File::open(path)?);
    import_scene(reader, sink, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use ovo_common::formats::write_chunk;

    fn node(name: &str, parent: Option<u32>, child_count: u32) -> Vec<u8> {
        NodeHeader {
            name: name.into(),
            parent,
            child_count,
            transform: Mat4::IDENTITY,
        }
        .encode()
    }

    fn stream(header: OvoFileHeader, chunks: &[(ChunkKind, Vec<u8>)]) -> Vec<u8> {
        let mut bytes = header.to_bytes().to_vec();
        for (kind, payload) in chunks {
            write_chunk(&mut bytes, *kind, 0, payload).unwrap();
        }
        bytes
    }

    fn header(chunks: u32, nodes: u32) -> OvoFileHeader {
        OvoFileHeader {
            chunk_count: chunks,
            node_count: nodes,
            ..Default::default()
        }
    }

    fn import(bytes: &[u8]) -> Result<Imported, ImportError> {
        import_scene(bytes, &mut discard_textures(), &OvoConfig::default())
    }

    #[test]
    fn test_minimal_stream() {
        let bytes = stream(
            header(2, 2),
            &[
                (ChunkKind::Node, node("root", None, 1)),
                (ChunkKind::Bone, node("hip", Some(0), 0)),
            ],
        );
        let imported = import(&bytes).unwrap();
        assert_eq!(imported.scene.nodes[1].kind, NodeKind::Bone);
        assert_eq!(imported.scene.nodes[0].children, vec![NodeId(1)]);
    }

    #[test]
    fn test_header_count_mismatch() {
        let bytes = stream(header(1, 2), &[(ChunkKind::Node, node("root", None, 0))]);
        let err = import(&bytes).unwrap_err();
        assert!(matches!(err, ImportError::MalformedStream { .. }));
        assert_eq!(err.offset(), Some(bytes.len() as u64));
    }

    #[test]
    fn test_truncated_header() {
        let err = import(&[b'O', b'V', b'O']).unwrap_err();
        assert!(matches!(err, ImportError::MalformedStream { offset: 0, .. }));
    }

    #[test]
    fn test_unknown_version() {
        let bytes = stream(
            OvoFileHeader {
                version: 99,
                ..Default::default()
            },
            &[],
        );
        assert!(matches!(
            import(&bytes).unwrap_err(),
            ImportError::UnknownVersion { found: 99, .. }
        ));
    }

    #[test]
    fn test_lod_without_mesh() {
        let lod = LodChunk {
            owner: 0,
            level: 1,
            target_triangles: 0,
            error: 0.0,
            geometry: Default::default(),
        };
        let bytes = stream(
            header(2, 1),
            &[
                (ChunkKind::Node, node("root", None, 0)),
                (ChunkKind::Lod, lod.encode(&mut Vec::new())),
            ],
        );
        let err = import(&bytes).unwrap_err();
        let lod_offset = (OvoFileHeader::SIZE + 8 + node("root", None, 0).len()) as u64;
        assert_eq!(err.offset(), Some(lod_offset));
    }

    #[test]
    fn test_unknown_chunk_preserved() {
        let bytes = stream(
            header(2, 1),
            &[
                (ChunkKind::Node, node("root", None, 0)),
                (ChunkKind::Unknown(900), vec![1, 2, 3]),
            ],
        );
        let imported = import(&bytes).unwrap();
        assert_eq!(imported.scene.extra_chunks.len(), 1);
        assert_eq!(imported.scene.extra_chunks[0].payload, vec![1, 2, 3]);
        assert_eq!(
            imported
                .report
                .count(|w| matches!(w, Warning::UnknownChunk { code: 900, .. })),
            1
        );
    }

    fn texture_chunk(index: u32) -> TextureChunk {
        TextureChunk {
            index,
            source_path: "t.png".into(),
            width: 1,
            height: 1,
            channels: 4,
            compression: Default::default(),
            flipped: false,
            placeholder: false,
            data: vec![9, 8, 7, 255],
        }
    }

    fn stream_with_texture(header: OvoFileHeader) -> Vec<u8> {
        let tex = texture_chunk(0);
        let mut bytes = header.to_bytes().to_vec();
        write_chunk(&mut bytes, ChunkKind::Texture, tex.flags(), &tex.encode()).unwrap();
        write_chunk(&mut bytes, ChunkKind::Node, 0, &node("root", None, 0)).unwrap();
        bytes
    }

    #[test]
    fn test_sink_receives_textures_after_success() {
        let header = OvoFileHeader {
            texture_count: 1,
            ..header(2, 1)
        };
        let mut seen = Vec::new();
        let mut sink = |t: &TextureAsset| seen.push(t.pixels.clone());
        let imported =
            import_scene(&stream_with_texture(header)[..], &mut sink, &OvoConfig::default()).unwrap();
        assert_eq!(imported.scene.textures.len(), 1);
        assert_eq!(seen, vec![vec![9, 8, 7, 255]]);
    }

    #[test]
    fn test_failed_stream_never_reaches_sink() {
        // Header claims two nodes; the texture decodes fine before the count check fails
        let header = OvoFileHeader {
            texture_count: 1,
            ..header(2, 2)
        };
        let mut calls = 0;
        let mut sink = |_: &TextureAsset| calls += 1;
        let err = import_scene(&stream_with_texture(header)[..], &mut sink, &OvoConfig::default())
            .unwrap_err();
        assert!(matches!(err, ImportError::MalformedStream { .. }));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_import_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_file(
            &dir.path().join("none.ovo"),
            &mut discard_textures(),
            &OvoConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}
