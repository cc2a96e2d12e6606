//! Quadric error edge-collapse simplification.
//!
//! Vertices are welded by position first so seams (split UVs/normals) move
//! together. Each welded vertex accumulates the plane quadrics of its faces,
//! plus a perpendicular plane per open boundary edge so borders hold their
//! shape. Edges collapse in ascending error order; queue entries carry the
//! version stamps of both endpoints and are dropped when either changed.
//! A collapse that would turn any surviving face upside down is rejected.
//!
//! Corners keep the attributes of their original vertex; only positions move.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::DVec3;
use hashbrown::{HashMap, HashSet};
use ovo_common::formats::{Geometry, Vertex};

/// Boundary plane weight relative to face planes.
const BOUNDARY_WEIGHT: f64 = 10.0;

/// Symmetric 4×4 error quadric, upper triangle.
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(n: DVec3, d: f64, weight: f64) -> Self {
        let (a, b, c) = (n.x, n.y, n.z);
        Self(
            [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ]
            .map(|v| v * weight),
        )
    }

    fn add(&mut self, other: &Quadric) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
    }

    fn sum(&self, other: &Quadric) -> Quadric {
        let mut out = *self;
        out.add(other);
        out
    }

    /// Sum of squared distances from `p` to the accumulated planes.
    fn error(&self, p: DVec3) -> f64 {
        let q = &self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        q[0] * x * x
            + 2.0 * q[1] * x * y
            + 2.0 * q[2] * x * z
            + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }
}

/// Queued collapse of welded vertex `b` into `a`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    a: usize,
    b: usize,
    stamps: (u32, u32),
    target: DVec3,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed: BinaryHeap pops the cheapest collapse first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.a.cmp(&self.a))
            .then_with(|| other.b.cmp(&self.b))
    }
}

/// Output of [`simplify`].
#[derive(Debug, Clone)]
pub struct Simplified {
    pub geometry: Geometry,
    /// Largest collapse error, as a distance in mesh units.
    pub max_error: f32,
}

struct Collapser {
    pos: Vec<DVec3>,
    quadrics: Vec<Quadric>,
    version: Vec<u32>,
    alive: Vec<bool>,
    /// Welded vertex ids per face
    faces: Vec<[usize; 3]>,
    /// Original vertex index per face corner
    corners: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vert_faces: Vec<Vec<usize>>,
    live_faces: usize,
    heap: BinaryHeap<Candidate>,
    max_error: f64,
}

impl Collapser {
    fn new(geometry: &Geometry) -> Self {
        // Weld by exact position; -0.0 and 0.0 are the same point
        let mut weld: HashMap<[u32; 3], usize> = HashMap::new();
        let mut pos = Vec::new();
        let weld_of: Vec<usize> = geometry
            .vertices
            .iter()
            .map(|v| {
                let key = v.position.to_array().map(|c| (c + 0.0).to_bits());
                *weld.entry(key).or_insert_with(|| {
                    pos.push(v.position.as_dvec3());
                    pos.len() - 1
                })
            })
            .collect();

        let n = pos.len();
        let mut faces = Vec::with_capacity(geometry.faces.len());
        let mut corners = Vec::with_capacity(geometry.faces.len());
        let mut vert_faces = vec![Vec::new(); n];
        for face in &geometry.faces {
            let tri = face.map(|i| weld_of[i as usize]);
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                continue;
            }
            let f = faces.len();
            for &v in &tri {
                vert_faces[v].push(f);
            }
            faces.push(tri);
            corners.push(*face);
        }

        let mut collapser = Self {
            pos,
            quadrics: vec![Quadric::default(); n],
            version: vec![0; n],
            alive: vec![true; n],
            live_faces: faces.len(),
            face_alive: vec![true; faces.len()],
            faces,
            corners,
            vert_faces,
            heap: BinaryHeap::new(),
            max_error: 0.0,
        };
        collapser.accumulate_quadrics();
        collapser.seed_edges();
        collapser
    }

    fn face_normal(&self, tri: &[usize; 3]) -> DVec3 {
        let [p0, p1, p2] = tri.map(|v| self.pos[v]);
        (p1 - p0).cross(p2 - p0)
    }

    fn accumulate_quadrics(&mut self) {
        let mut edge_use: HashMap<(usize, usize), u32> = HashMap::new();
        for tri in &self.faces {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                *edge_use.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }

        for f in 0..self.faces.len() {
            let tri = self.faces[f];
            let Some(n) = self.face_normal(&tri).try_normalize() else {
                continue;
            };
            let p0 = self.pos[tri[0]];
            let q = Quadric::from_plane(n, -n.dot(p0), 1.0);
            for &v in &tri {
                self.quadrics[v].add(&q);
            }

            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                if edge_use[&(a.min(b), a.max(b))] != 1 {
                    continue;
                }
                let Some(bn) = (self.pos[b] - self.pos[a]).cross(n).try_normalize() else {
                    continue;
                };
                let q = Quadric::from_plane(bn, -bn.dot(self.pos[a]), BOUNDARY_WEIGHT);
                self.quadrics[a].add(&q);
                self.quadrics[b].add(&q);
            }
        }
    }

    fn seed_edges(&mut self) {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for f in 0..self.faces.len() {
            let tri = self.faces[f];
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                let edge = (a.min(b), a.max(b));
                if seen.insert(edge) {
                    self.push_candidate(edge.0, edge.1);
                }
            }
        }
    }

    fn push_candidate(&mut self, a: usize, b: usize) {
        let (a, b) = (a.min(b), a.max(b));
        let q = self.quadrics[a].sum(&self.quadrics[b]);
        let (pa, pb) = (self.pos[a], self.pos[b]);
        let (target, error) = [pa, pb, (pa + pb) * 0.5]
            .into_iter()
            .map(|p| (p, q.error(p)))
            .fold((pa, f64::INFINITY), |best, c| if c.1 < best.1 { c } else { best });
        self.heap.push(Candidate {
            cost: error.max(0.0),
            a,
            b,
            stamps: (self.version[a], self.version[b]),
            target,
        });
    }

    /// Would moving `a` and `b` to `p` turn any surviving face over?
    fn flips(&self, a: usize, b: usize, p: DVec3) -> bool {
        self.vert_faces[a]
            .iter()
            .chain(&self.vert_faces[b])
            .filter(|&&f| self.face_alive[f])
            .any(|&f| {
                let tri = self.faces[f];
                if tri.contains(&a) && tri.contains(&b) {
                    return false;
                }
                let before = self.face_normal(&tri);
                let moved = tri.map(|v| if v == a || v == b { p } else { self.pos[v] });
                let after = (moved[1] - moved[0]).cross(moved[2] - moved[0]);
                before.length_squared() > 1e-30 && before.dot(after) <= 0.0
            })
    }

    fn collapse(&mut self, a: usize, b: usize, p: DVec3) {
        self.pos[a] = p;
        let qb = self.quadrics[b];
        self.quadrics[a].add(&qb);
        self.alive[b] = false;
        self.version[a] += 1;
        self.version[b] += 1;

        for f in std::mem::take(&mut self.vert_faces[b]) {
            if !self.face_alive[f] {
                continue;
            }
            if self.faces[f].contains(&a) {
                self.face_alive[f] = false;
                self.live_faces -= 1;
            } else {
                for v in &mut self.faces[f] {
                    if *v == b {
                        *v = a;
                    }
                }
                self.vert_faces[a].push(f);
            }
        }
        let face_alive = &self.face_alive;
        self.vert_faces[a].retain(|&f| face_alive[f]);
        self.vert_faces[a].sort_unstable();
        self.vert_faces[a].dedup();

        let mut neighbors: Vec<usize> = Vec::new();
        for &f in &self.vert_faces[a] {
            for &v in &self.faces[f] {
                if v != a && !neighbors.contains(&v) {
                    neighbors.push(v);
                }
            }
        }
        for n in neighbors {
            self.push_candidate(a, n);
        }
    }

    fn run(&mut self, target_triangles: usize, max_error: Option<f32>) {
        while self.live_faces > target_triangles {
            let Some(c) = self.heap.pop() else {
                break;
            };
            let stale = !self.alive[c.a]
                || !self.alive[c.b]
                || self.version[c.a] != c.stamps.0
                || self.version[c.b] != c.stamps.1;
            if stale {
                continue;
            }
            if let Some(limit) = max_error {
                if c.cost.sqrt() > limit as f64 {
                    break;
                }
            }
            if self.flips(c.a, c.b, c.target) {
                continue;
            }
            self.collapse(c.a, c.b, c.target);
            self.max_error = self.max_error.max(c.cost.sqrt());
        }
    }

    fn finish(&self, source: &Geometry) -> Geometry {
        let mut remap: HashMap<(u32, usize), u32> = HashMap::new();
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut faces = Vec::with_capacity(self.live_faces);

        for (f, tri) in self.faces.iter().enumerate() {
            if !self.face_alive[f] {
                continue;
            }
            let mut out = [0u32; 3];
            for k in 0..3 {
                let (orig, welded) = (self.corners[f][k], tri[k]);
                out[k] = *remap.entry((orig, welded)).or_insert_with(|| {
                    let mut v = source.vertices[orig as usize];
                    v.position = self.pos[welded].as_vec3();
                    vertices.push(v);
                    (vertices.len() - 1) as u32
                });
            }
            faces.push(out);
        }
        Geometry { vertices, faces }
    }
}

/// Simplify `geometry` down to at most `target_triangles`, stopping early
/// when the next collapse would exceed `max_error` (mesh units).
///
/// The result may keep more triangles than requested when no further
/// collapse is possible without flipping faces.
pub fn simplify(geometry: &Geometry, target_triangles: usize, max_error: Option<f32>) -> Simplified {
    let mut collapser = Collapser::new(geometry);
    collapser.run(target_triangles, max_error.filter(|&e| e > 0.0));
    Simplified {
        geometry: collapser.finish(geometry),
        max_error: collapser.max_error as f32,
    }
}
