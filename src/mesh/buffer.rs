//! The mesh buffer: positions plus a triangle index list.
//!
//! [`MeshBuffer`] is the only mutable store of vertex and face counts in a
//! pipeline run. Vertices can be appended (the topology cleaner does this when
//! it splits bowties) but never removed or reordered, so every [`VertexId`]
//! issued earlier stays valid.

use nalgebra::{Point3, Vector3};

use super::index::{FaceId, VertexId};
use crate::error::{AtlasError, Result};

/// Flat, index-addressed triangle mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshBuffer {
    positions: Vec<Point3<f32>>,
    triangles: Vec<[u32; 3]>,
}

impl MeshBuffer {
    /// Build a mesh from a position array and a flat triangle index list.
    ///
    /// All checks run before anything is allocated, so a rejected input costs
    /// no memory.
    ///
    /// # Errors
    ///
    /// - [`AtlasError::EmptyInput`] if either array is empty
    /// - [`AtlasError::TruncatedIndexBuffer`] if `indices.len()` is not a multiple of 3
    /// - [`AtlasError::FaceCountOverflow`] if the index count does not fit in 32 bits
    /// - [`AtlasError::IndexOutOfRange`] if any index is `>= positions.len()`
    /// - [`AtlasError::OutOfMemory`] if the buffers cannot be allocated
    ///
    /// # Example
    ///
    /// ```
    /// use tessera::mesh::MeshBuffer;
    ///
    /// let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    /// let mesh = MeshBuffer::create(&positions, &[0, 1, 2]).unwrap();
    /// assert_eq!(mesh.vertex_count(), 3);
    /// assert_eq!(mesh.face_count(), 1);
    /// ```
    pub fn create(positions: &[[f32; 3]], indices: &[u32]) -> Result<Self> {
        if positions.is_empty() || indices.is_empty() {
            return Err(AtlasError::EmptyInput);
        }
        if indices.len() % 3 != 0 {
            return Err(AtlasError::TruncatedIndexBuffer { len: indices.len() });
        }
        let faces = indices.len() / 3;
        check_face_count(faces)?;
        check_index_range(indices, positions.len())?;

        let mut mesh = Self::with_capacity(positions.len(), faces)?;
        mesh.positions
            .extend(positions.iter().map(|p| Point3::new(p[0], p[1], p[2])));
        mesh.triangles
            .extend(indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]]));
        Ok(mesh)
    }

    /// Build a mesh from split coordinate arrays (`xs[i], ys[i], zs[i]` is vertex `i`).
    ///
    /// # Errors
    ///
    /// Same as [`MeshBuffer::create`], plus [`AtlasError::InvalidParameter`]
    /// when the coordinate arrays differ in length.
    pub fn from_components(xs: &[f32], ys: &[f32], zs: &[f32], indices: &[u32]) -> Result<Self> {
        if ys.len() != xs.len() {
            return Err(AtlasError::invalid_param("ys.len", ys.len(), "must match xs.len"));
        }
        if zs.len() != xs.len() {
            return Err(AtlasError::invalid_param("zs.len", zs.len(), "must match xs.len"));
        }
        let positions: Vec<[f32; 3]> = xs
            .iter()
            .zip(ys)
            .zip(zs)
            .map(|((&x, &y), &z)| [x, y, z])
            .collect();
        Self::create(&positions, indices)
    }

    fn with_capacity(vertices: usize, faces: usize) -> Result<Self> {
        let mut positions = Vec::new();
        positions.try_reserve_exact(vertices)?;
        let mut triangles = Vec::new();
        triangles.try_reserve_exact(faces)?;
        Ok(Self {
            positions,
            triangles,
        })
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    /// Position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> Point3<f32> {
        self.positions[v.index()]
    }

    /// Position of a vertex, widened to `f64` for geometry computations.
    #[inline]
    pub fn position_f64(&self, v: VertexId) -> Point3<f64> {
        self.positions[v.index()].cast::<f64>()
    }

    /// The three vertex indices of a triangle.
    #[inline]
    pub fn triangle(&self, f: FaceId) -> [u32; 3] {
        self.triangles[f.index()]
    }

    /// Area vector of a triangle: its normal scaled to twice its area.
    ///
    /// `None` for a repeated index, or when the area vanishes relative to the
    /// squared edge lengths.
    pub fn face_normal(&self, f: FaceId) -> Option<Vector3<f64>> {
        let [a, b, c] = self.triangle(f);
        if a == b || b == c || a == c {
            return None;
        }
        let p0 = self.position_f64(VertexId::from_raw(a));
        let e1 = self.position_f64(VertexId::from_raw(b)) - p0;
        let e2 = self.position_f64(VertexId::from_raw(c)) - p0;
        let normal = e1.cross(&e2);
        let scale = e1.norm_squared() + e2.norm_squared();
        if !(normal.norm() > 1e-12 * scale) {
            return None;
        }
        Some(normal)
    }

    /// All positions.
    pub fn positions(&self) -> &[Point3<f32>] {
        &self.positions
    }

    /// All triangles.
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Iterate over all face ids.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> {
        (0..self.triangles.len()).map(FaceId::new)
    }

    /// Append a vertex and return its index.
    pub fn append_vertex(&mut self, position: Point3<f32>) -> VertexId {
        let id = VertexId::new(self.positions.len());
        self.positions.push(position);
        id
    }

    /// Append a copy of an existing vertex and return the new index.
    pub fn duplicate_vertex(&mut self, source: VertexId) -> VertexId {
        let position = self.positions[source.index()];
        self.append_vertex(position)
    }

    /// Re-point one corner of a triangle at another vertex.
    ///
    /// # Panics
    ///
    /// Panics if the face or corner is out of range, or (in debug builds) if
    /// the vertex does not exist.
    pub fn set_corner(&mut self, f: FaceId, corner: usize, v: VertexId) {
        debug_assert!(v.index() < self.positions.len());
        self.triangles[f.index()][corner] = v.raw();
    }

    /// Flatten positions into the caller-facing `[x, y, z]` layout.
    pub fn position_array(&self) -> Vec<[f32; 3]> {
        self.positions.iter().map(|p| [p.x, p.y, p.z]).collect()
    }

    /// Flatten triangles into a plain index list.
    pub fn index_array(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

/// Reject face counts whose index count would not fit in 32 bits.
pub(crate) fn check_face_count(faces: usize) -> Result<()> {
    if faces as u64 * 3 >= u32::MAX as u64 {
        return Err(AtlasError::FaceCountOverflow { faces });
    }
    Ok(())
}

fn check_index_range(indices: &[u32], vertex_count: usize) -> Result<()> {
    match indices.iter().position(|&i| i as usize >= vertex_count) {
        Some(pos) => Err(AtlasError::IndexOutOfRange {
            face: pos / 3,
            vertex: indices[pos],
            vertex_count,
        }),
        None => Ok(()),
    }
}
