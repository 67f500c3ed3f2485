//! Face adjacency with positional welding.
//!
//! For every triangle edge the table stores the triangle on the other side, or
//! nothing for a boundary edge. Vertices are first collapsed onto *point
//! representatives*: the lowest-index vertex lying within `epsilon` of them.
//! Edges are then matched on representatives, so two triangles that only share
//! positions (not indices) are still neighbours.
//!
//! Edge `e` of a triangle runs from corner `e` to corner `(e + 1) % 3`.
//!
//! # Example
//!
//! ```
//! use tessera::mesh::{AdjacencyTable, FaceId, MeshBuffer};
//!
//! let positions = [
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [1.0, 1.0, 0.0],
//! ];
//! let mesh = MeshBuffer::create(&positions, &[0, 1, 2, 2, 1, 3]).unwrap();
//! let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
//!
//! assert_eq!(adjacency.neighbor(FaceId::new(0), 1), Some(FaceId::new(1)));
//! assert_eq!(adjacency.neighbor(FaceId::new(0), 0), None);
//! ```

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::Point3;
use rayon::prelude::*;

use super::buffer::MeshBuffer;
use super::index::{FaceId, VertexId, INVALID_INDEX};
use crate::error::{AtlasError, Result};

/// Options for adjacency construction.
#[derive(Debug, Clone)]
pub struct AdjacencyOptions {
    /// Two positions closer than this (Euclidean) are the same point.
    pub epsilon: f32,

    /// Whether to compute per-face edge keys in parallel (default: true).
    pub parallel: bool,
}

impl Default for AdjacencyOptions {
    fn default() -> Self {
        Self {
            epsilon: 0.0,
            parallel: true,
        }
    }
}

impl AdjacencyOptions {
    /// Set the welding tolerance.
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// An edge claimed by more than two triangles.
///
/// The first two faces (in triangle order) were paired; the rest see the
/// edge as boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifoldViolation {
    /// The edge, as a pair of point representatives (smaller first).
    pub edge: (VertexId, VertexId),
    /// Every face on the edge, in triangle order.
    pub faces: Vec<FaceId>,
}

/// Per-face neighbour table.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjacencyTable {
    neighbors: Vec<[u32; 3]>,
    point_reps: Vec<u32>,
    degenerate: Vec<bool>,
    violations: Vec<ManifoldViolation>,
}

impl AdjacencyTable {
    /// Build adjacency with the given welding tolerance.
    ///
    /// # Errors
    ///
    /// - [`AtlasError::DegenerateMesh`] if the mesh has no faces or vertices
    /// - [`AtlasError::InvalidParameter`] if `epsilon` is negative or not finite
    pub fn build(mesh: &MeshBuffer, epsilon: f32) -> Result<Self> {
        build_adjacency(mesh, &AdjacencyOptions::default().with_epsilon(epsilon))
    }

    /// Number of faces the table was built for.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of vertices the table was built for.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.point_reps.len()
    }

    /// Whether the mesh changed shape since this table was built.
    pub fn is_stale(&self, mesh: &MeshBuffer) -> bool {
        self.vertex_count() != mesh.vertex_count() || self.face_count() != mesh.face_count()
    }

    /// Fail with [`AtlasError::InvalidState`] unless the table matches `mesh`.
    pub fn ensure_current(&self, mesh: &MeshBuffer) -> Result<()> {
        if self.is_stale(mesh) {
            return Err(AtlasError::InvalidState(format!(
                "adjacency built for {} vertices / {} faces, mesh has {} / {}",
                self.vertex_count(),
                self.face_count(),
                mesh.vertex_count(),
                mesh.face_count()
            )));
        }
        Ok(())
    }

    /// The face across edge `edge` of face `f`, if any.
    #[inline]
    pub fn neighbor(&self, f: FaceId, edge: usize) -> Option<FaceId> {
        let n = self.neighbors[f.index()][edge];
        (n != INVALID_INDEX).then(|| FaceId::from_raw(n))
    }

    /// Raw neighbour slots of a face (`INVALID_INDEX` for boundary).
    #[inline]
    pub fn neighbors(&self, f: FaceId) -> [u32; 3] {
        self.neighbors[f.index()]
    }

    /// The point representative of a vertex.
    #[inline]
    pub fn point_rep(&self, v: VertexId) -> VertexId {
        VertexId::from_raw(self.point_reps[v.index()])
    }

    /// Whether a face has two corners on the same point.
    #[inline]
    pub fn is_degenerate(&self, f: FaceId) -> bool {
        self.degenerate[f.index()]
    }

    /// Edges shared by more than two faces.
    pub fn violations(&self) -> &[ManifoldViolation] {
        &self.violations
    }

    /// Number of boundary edge slots over all faces.
    pub fn boundary_edge_count(&self) -> usize {
        self.neighbors
            .iter()
            .flatten()
            .filter(|&&n| n == INVALID_INDEX)
            .count()
    }
}

/// Build adjacency for `mesh`.
///
/// Runs in near-linear time: point representatives come from a spatial hash
/// whose cells are `epsilon` wide, and edges are matched through a hash map.
/// The result depends only on vertex and triangle order.
///
/// # Errors
///
/// See [`AdjacencyTable::build`].
pub fn build_adjacency(mesh: &MeshBuffer, options: &AdjacencyOptions) -> Result<AdjacencyTable> {
    if mesh.face_count() == 0 || mesh.vertex_count() == 0 {
        return Err(AtlasError::DegenerateMesh(
            "adjacency needs at least one face and one vertex".into(),
        ));
    }
    if !options.epsilon.is_finite() || options.epsilon < 0.0 {
        return Err(AtlasError::invalid_param(
            "adjacency_epsilon",
            options.epsilon,
            "must be finite and >= 0",
        ));
    }

    let point_reps = point_representatives(mesh.positions(), options.epsilon);

    let edge_keys = |tri: &[u32; 3]| -> Option<[(u32, u32); 3]> {
        let r = tri.map(|v| point_reps[v as usize]);
        if r[0] == r[1] || r[1] == r[2] || r[0] == r[2] {
            return None;
        }
        Some([0usize, 1, 2].map(|e| {
            let (a, b) = (r[e], r[(e + 1) % 3]);
            if a < b {
                (a, b)
            } else {
                (b, a)
            }
        }))
    };
    let face_keys: Vec<Option<[(u32, u32); 3]>> = if options.parallel {
        mesh.triangles().par_iter().map(edge_keys).collect()
    } else {
        mesh.triangles().iter().map(edge_keys).collect()
    };

    let mut edge_faces: HashMap<(u32, u32), Vec<(u32, u8)>> = HashMap::new();
    for (f, keys) in face_keys.iter().enumerate() {
        if let Some(keys) = keys {
            for (e, key) in keys.iter().enumerate() {
                edge_faces.entry(*key).or_default().push((f as u32, e as u8));
            }
        }
    }

    let mut neighbors = vec![[INVALID_INDEX; 3]; mesh.face_count()];
    let mut violations = Vec::new();

    // Walk edges in first-use order so pairing never depends on hash order.
    for keys in face_keys.iter().flatten() {
        for key in keys {
            let Some(claims) = edge_faces.remove(key) else {
                continue;
            };
            if claims.len() > 2 {
                violations.push(ManifoldViolation {
                    edge: (VertexId::from_raw(key.0), VertexId::from_raw(key.1)),
                    faces: claims.iter().map(|&(f, _)| FaceId::from_raw(f)).collect(),
                });
            }

            let (f0, e0) = claims[0];
            let partner = claims.iter().skip(1).find(|&&(f1, _)| {
                f1 != f0 && !neighbors[f0 as usize].contains(&f1)
            });
            if let Some(&(f1, e1)) = partner {
                neighbors[f0 as usize][e0 as usize] = f1;
                neighbors[f1 as usize][e1 as usize] = f0;
            }
        }
    }

    let degenerate: Vec<bool> = face_keys.iter().map(Option::is_none).collect();

    let table = AdjacencyTable {
        neighbors,
        point_reps,
        degenerate,
        violations,
    };

    debug!(
        "adjacency: {} faces, {} boundary edges, epsilon {}",
        table.face_count(),
        table.boundary_edge_count(),
        options.epsilon
    );
    if !table.violations.is_empty() {
        warn!(
            "adjacency: {} edges are shared by more than two faces",
            table.violations.len()
        );
    }

    Ok(table)
}

/// Map each vertex to the lowest-index vertex at the same point.
fn point_representatives(positions: &[Point3<f32>], epsilon: f32) -> Vec<u32> {
    let mut reps = Vec::with_capacity(positions.len());

    if epsilon == 0.0 {
        let mut seen: HashMap<[u32; 3], u32> = HashMap::with_capacity(positions.len());
        for (i, p) in positions.iter().enumerate() {
            // Adding 0.0 folds -0.0 onto 0.0.
            let key = [(p.x + 0.0).to_bits(), (p.y + 0.0).to_bits(), (p.z + 0.0).to_bits()];
            reps.push(*seen.entry(key).or_insert(i as u32));
        }
        return reps;
    }

    let eps = epsilon as f64;
    let eps_sq = eps * eps;
    let cell_of = |p: &Point3<f32>| -> [i64; 3] {
        [p.x, p.y, p.z].map(|c| (c as f64 / eps).floor() as i64)
    };

    let mut grid: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    for (i, p) in positions.iter().enumerate() {
        let cell = cell_of(p);
        let pf = p.cast::<f64>();
        let mut rep = i as u32;

        for dx in -1..=1i64 {
            for dy in -1..=1i64 {
                for dz in -1..=1i64 {
                    let key = [
                        cell[0].saturating_add(dx),
                        cell[1].saturating_add(dy),
                        cell[2].saturating_add(dz),
                    ];
                    let Some(bucket) = grid.get(&key) else {
                        continue;
                    };
                    for &j in bucket {
                        let q = positions[j as usize].cast::<f64>();
                        if (pf - q).norm_squared() <= eps_sq {
                            rep = rep.min(reps[j as usize]);
                        }
                    }
                }
            }
        }

        reps.push(rep);
        grid.entry(cell).or_default().push(i as u32);
    }

    reps
}
