//! OBJ mesh loading

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use glam::{Vec2, Vec3, Vec4};
use hashbrown::HashMap;
use ovo_common::formats::{Geometry, Vertex};

/// Load an OBJ file as indexed triangle geometry with generated tangents.
pub fn load_obj(input: &Path) -> Result<Geometry> {
    let file = File::open(input).with_context(|| format!("Failed to open OBJ: {:?}", input))?;
    let geometry = parse_obj(BufReader::new(file))
        .with_context(|| format!("Failed to parse OBJ: {:?}", input))?;
    tracing::info!(
        "Loaded OBJ mesh {}: {} vertices, {} triangles",
        input.display(),
        geometry.vertices.len(),
        geometry.faces.len()
    );
    Ok(geometry)
}

/// Parse OBJ text. Polygons are fan-triangulated; corners sharing the same
/// `v/vt/vn` triple share a vertex.
pub fn parse_obj(reader: impl Read) -> Result<Geometry> {
    let reader = BufReader::new(reader);

    let mut positions: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<Vec2> = Vec::new();
    let mut normals_raw: Vec<Vec3> = Vec::new();

    let mut corners: HashMap<(usize, Option<usize>, Option<usize>), u32> = HashMap::new();
    let mut vertices: Vec<Vertex> = Vec::new();
    let mut faces: Vec<[u32; 3]> = Vec::new();
    let mut has_normals = true;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "v" if parts.len() >= 4 => positions.push(parse_vec3(&parts[1..4], line_no)?),
            "vt" if parts.len() >= 3 => {
                let u = parse_f32(parts[1], line_no)?;
                let v = parse_f32(parts[2], line_no)?;
                // OBJ puts the V origin at the bottom
                tex_coords.push(Vec2::new(u, 1.0 - v));
            }
            "vn" if parts.len() >= 4 => normals_raw.push(parse_vec3(&parts[1..4], line_no)?),
            "f" if parts.len() >= 4 => {
                let mut face_verts = Vec::with_capacity(parts.len() - 1);
                for part in &parts[1..] {
                    let Some(corner) = parse_obj_vertex(part) else {
                        bail!("line {}: bad face vertex '{part}'", line_no + 1);
                    };
                    face_verts.push(corner);
                }

                let mut indices = Vec::with_capacity(face_verts.len());
                for (vi, vti, vni) in face_verts {
                    let Some(&position) = positions.get(vi) else {
                        bail!("line {}: vertex {} not defined", line_no + 1, vi + 1);
                    };
                    has_normals &= vni.is_some();
                    let index = *corners.entry((vi, vti, vni)).or_insert_with(|| {
                        vertices.push(Vertex {
                            position,
                            normal: vni
                                .and_then(|i| normals_raw.get(i).copied())
                                .unwrap_or(Vec3::Y),
                            uv: vti.and_then(|i| tex_coords.get(i).copied()).unwrap_or(Vec2::ZERO),
                            ..Default::default()
                        });
                        (vertices.len() - 1) as u32
                    });
                    indices.push(index);
                }

                // Triangulate (fan triangulation for convex polygons)
                for i in 1..indices.len() - 1 {
                    faces.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if faces.is_empty() {
        bail!("No faces found in OBJ file");
    }

    let mut geometry = Geometry { vertices, faces };
    if !has_normals {
        smooth_normals(&mut geometry);
    }
    if !generate_tangents(&mut geometry) {
        tracing::warn!("Tangent generation failed, using default tangents");
    }
    Ok(geometry)
}

fn parse_f32(s: &str, line_no: usize) -> Result<f32> {
    s.parse()
        .with_context(|| format!("line {}: bad number '{s}'", line_no + 1))
}

fn parse_vec3(parts: &[&str], line_no: usize) -> Result<Vec3> {
    Ok(Vec3::new(
        parse_f32(parts[0], line_no)?,
        parse_f32(parts[1], line_no)?,
        parse_f32(parts[2], line_no)?,
    ))
}

/// Parse OBJ vertex reference: "v", "v/vt", "v/vt/vn", or "v//vn"
fn parse_obj_vertex(s: &str) -> Option<(usize, Option<usize>, Option<usize>)> {
    let parts: Vec<&str> = s.split('/').collect();

    let vi = parts.first()?.parse::<usize>().ok()?.checked_sub(1)?; // OBJ indices are 1-based

    let vti = parts
        .get(1)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    let vni = parts
        .get(2)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    Some((vi, vti, vni))
}

/// Area-weighted vertex normals for files without `vn`.
fn smooth_normals(geometry: &mut Geometry) {
    let mut sums = vec![Vec3::ZERO; geometry.vertices.len()];
    for face in &geometry.faces {
        let [a, b, c] = face.map(|i| geometry.vertices[i as usize].position);
        let n = (b - a).cross(c - a);
        for &i in face {
            sums[i as usize] += n;
        }
    }
    for (v, n) in geometry.vertices.iter_mut().zip(sums) {
        v.normal = n.try_normalize().unwrap_or(Vec3::Y);
    }
}

struct TangentSpace<'a>(&'a mut Geometry);

impl TangentSpace<'_> {
    fn vertex(&self, face: usize, vert: usize) -> &Vertex {
        &self.0.vertices[self.0.faces[face][vert] as usize]
    }
}

impl bevy_mikktspace::Geometry for TangentSpace<'_> {
    fn num_faces(&self) -> usize {
        self.0.faces.len()
    }

    fn num_vertices_of_face(&self, _face: usize) -> usize {
        3
    }

    fn position(&self, face: usize, vert: usize) -> [f32; 3] {
        self.vertex(face, vert).position.to_array()
    }

    fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
        self.vertex(face, vert).normal.to_array()
    }

    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
        self.vertex(face, vert).uv.to_array()
    }

    fn set_tangent(
        &mut self,
        tangent: [f32; 3],
        _bi_tangent: [f32; 3],
        _f_mag_s: f32,
        _f_mag_t: f32,
        bi_tangent_preserves_orientation: bool,
        face: usize,
        vert: usize,
    ) {
        let sign = if bi_tangent_preserves_orientation { 1.0 } else { -1.0 };
        let index = self.0.faces[face][vert] as usize;
        // Shared corners get the last write; mikktspace agrees on them
        self.0.vertices[index].tangent = Vec3::from_array(tangent).extend(sign);
    }
}

fn generate_tangents(geometry: &mut Geometry) -> bool {
    let ok = bevy_mikktspace::generate_tangents(&mut TangentSpace(geometry));
    if !ok {
        for v in &mut geometry.vertices {
            v.tangent = Vec4::new(1.0, 0.0, 0.0, 1.0);
        }
    }
    ok
}
