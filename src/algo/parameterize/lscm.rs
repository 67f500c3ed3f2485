//! Conformal chart flattening.
//!
//! Each triangle contributes the squared violation of the Cauchy-Riemann
//! equations by its linear UV map, weighted by area. Fixing two vertices
//! removes the similarity freedom; their unknowns are eliminated from the
//! system, leaving a symmetric positive definite matrix for CG.
//!
//! See Lévy et al., "Least squares conformal maps for automatic texture
//! atlas generation", SIGGRAPH 2002.

use nalgebra::{DVector, Point2, Point3};

use crate::error::{AtlasError, Result};

use super::projection::{average_normal, planar_projection};
use super::sparse::{conjugate_gradient, CsrMatrix};
use super::uv::{local_frame, UVMap};

/// Conformal solve settings.
#[derive(Debug, Clone)]
pub struct LSCMOptions {
    /// Which two vertices are held fixed.
    pub pin_strategy: PinStrategy,

    /// CG iteration cap. Hitting it is a [`AtlasError::ConvergenceFailed`].
    pub max_iterations: usize,

    /// Relative residual at which CG stops.
    pub tolerance: f64,
}

impl Default for LSCMOptions {
    fn default() -> Self {
        Self {
            pin_strategy: PinStrategy::Automatic,
            max_iterations: 1000,
            tolerance: 1e-8,
        }
    }
}

impl LSCMOptions {
    /// Pins picked from the chart boundary. Same as `default()`.
    pub fn automatic() -> Self {
        Self::default()
    }

    /// Hold two given vertices at given UVs.
    pub fn with_pins(pin0: PinnedVertex, pin1: PinnedVertex) -> Self {
        Self {
            pin_strategy: PinStrategy::Manual(pin0, pin1),
            ..Default::default()
        }
    }

    /// Override the CG iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the CG stopping residual.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// How the two fixed vertices are chosen.
#[derive(Debug, Clone)]
pub enum PinStrategy {
    /// Two far-apart boundary vertices, held at their initial UVs.
    Automatic,

    /// Caller-chosen chart vertices and UVs.
    Manual(PinnedVertex, PinnedVertex),
}

/// A chart-local vertex held at `(u, v)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinnedVertex {
    /// Chart-local vertex index.
    pub vertex: usize,
    /// Fixed U.
    pub u: f64,
    /// Fixed V.
    pub v: f64,
}

impl PinnedVertex {
    /// Hold `vertex` at `(u, v)`.
    pub fn new(vertex: usize, u: f64, v: f64) -> Self {
        Self { vertex, u, v }
    }
}

/// Conformally flatten the chart `faces` over `positions`.
///
/// The initial guess (and the automatic pin coordinates) come from a planar
/// projection along the chart's area-weighted normal.
///
/// # Errors
///
/// - [`AtlasError::EmptyInput`] if there are no faces
/// - [`AtlasError::DegenerateMesh`] if the chart is closed or has no usable area
/// - [`AtlasError::InvalidParameter`] for unusable manual pins
/// - [`AtlasError::ConvergenceFailed`] if the solver runs out of iterations
///
/// # Example
///
/// ```
/// use tessera::algo::parameterize::{lscm, LSCMOptions};
/// use tessera::nalgebra::Point3;
///
/// // Two unit squares meeting at a right angle.
/// let positions = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(1.0, 1.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(1.0, 0.0, 1.0),
///     Point3::new(1.0, 1.0, 1.0),
/// ];
/// let faces = [[0, 1, 2], [0, 2, 3], [1, 4, 5], [1, 5, 2]];
/// let uvs = lscm(&positions, &faces, &LSCMOptions::default()).unwrap();
///
/// // Both halves keep their shape in the plane.
/// assert!(uvs.max_stretch(&positions, &faces) < 1e-4);
/// ```
pub fn lscm(positions: &[Point3<f64>], faces: &[[usize; 3]], options: &LSCMOptions) -> Result<UVMap> {
    if faces.is_empty() {
        return Err(AtlasError::EmptyInput);
    }
    let normal = average_normal(positions, faces)
        .ok_or_else(|| AtlasError::DegenerateMesh("chart has no area".into()))?;
    let initial = planar_projection(positions, &normal);
    lscm_from(positions, faces, &initial, options)
}

/// Compute an LSCM parameterization starting from `initial`.
///
/// `initial` supplies both the solver's starting point and, with
/// [`PinStrategy::Automatic`], the coordinates of the pinned vertices. When
/// `initial` is already conformal the solver returns it unchanged.
///
/// # Errors
///
/// Same as [`lscm`].
pub fn lscm_from(
    positions: &[Point3<f64>],
    faces: &[[usize; 3]],
    initial: &UVMap,
    options: &LSCMOptions,
) -> Result<UVMap> {
    let n = positions.len();
    if faces.is_empty() || n == 0 {
        return Err(AtlasError::EmptyInput);
    }
    if initial.len() != n {
        return Err(AtlasError::invalid_param(
            "initial",
            initial.len(),
            "needs one UV per chart vertex",
        ));
    }

    let (pin0, pin1) = match &options.pin_strategy {
        PinStrategy::Automatic => {
            let boundary = boundary_vertices(faces, n);
            if boundary.is_empty() {
                return Err(AtlasError::DegenerateMesh("chart has no boundary".into()));
            }
            let (a, b) = farthest_boundary_pair(positions, &boundary);
            let (ua, ub) = (initial.get(a), initial.get(b));
            (
                PinnedVertex::new(a, ua.x, ua.y),
                PinnedVertex::new(b, ub.x, ub.y),
            )
        }
        PinStrategy::Manual(p0, p1) => (*p0, *p1),
    };
    check_pins(&pin0, &pin1, n)?;

    // Free vertices are renumbered densely; pins drop out of the system.
    let free_vertices: Vec<usize> = (0..n)
        .filter(|&v| v != pin0.vertex && v != pin1.vertex)
        .collect();
    let free_count = free_vertices.len();
    let mut free_index: Vec<Option<usize>> = vec![None; n];
    for (k, &v) in free_vertices.iter().enumerate() {
        free_index[v] = Some(k);
    }

    let mut coords = initial.as_slice().to_vec();
    coords[pin0.vertex] = Point2::new(pin0.u, pin0.v);
    coords[pin1.vertex] = Point2::new(pin1.u, pin1.v);

    if free_count > 0 {
        let (matrix, rhs) = build_lscm_system(positions, faces, &free_index, free_count, &coords);

        let x0 = DVector::from_fn(2 * free_count, |row, _| {
            let uv = coords[free_vertices[row % free_count]];
            if row < free_count {
                uv.x
            } else {
                uv.y
            }
        });

        let (solution, iterations) =
            conjugate_gradient(&matrix, &rhs, Some(&x0), options.max_iterations, options.tolerance)?;
        log::debug!(
            "lscm: {} free vertices solved in {} iterations",
            free_count,
            iterations
        );

        for (k, &v) in free_vertices.iter().enumerate() {
            coords[v] = Point2::new(solution[k], solution[free_count + k]);
        }
    }

    Ok(UVMap::new(coords))
}

fn check_pins(pin0: &PinnedVertex, pin1: &PinnedVertex, n: usize) -> Result<()> {
    for pin in [pin0, pin1] {
        if pin.vertex >= n {
            return Err(AtlasError::invalid_param(
                "pin_strategy",
                pin.vertex,
                "pinned vertex is out of range",
            ));
        }
        if !(pin.u.is_finite() && pin.v.is_finite()) {
            return Err(AtlasError::invalid_param(
                "pin_strategy",
                format!("({}, {})", pin.u, pin.v),
                "pinned UV must be finite",
            ));
        }
    }
    if pin0.vertex == pin1.vertex {
        return Err(AtlasError::invalid_param(
            "pin_strategy",
            pin0.vertex,
            "pins must be distinct vertices",
        ));
    }
    if pin0.u == pin1.u && pin0.v == pin1.v {
        return Err(AtlasError::DegenerateMesh(
            "pinned vertices share one UV".into(),
        ));
    }
    Ok(())
}

/// Vertices on an edge used by exactly one face, ascending.
fn boundary_vertices(faces: &[[usize; 3]], vertex_count: usize) -> Vec<usize> {
    let mut edges: Vec<(usize, usize)> = faces
        .iter()
        .flat_map(|&[a, b, c]| [(a, b), (b, c), (c, a)])
        .map(|(a, b)| (a.min(b), a.max(b)))
        .collect();
    edges.sort_unstable();

    let mut on_boundary = vec![false; vertex_count];
    let mut i = 0;
    while i < edges.len() {
        let run = edges[i..].iter().take_while(|&&e| e == edges[i]).count();
        if run == 1 {
            let (a, b) = edges[i];
            on_boundary[a] = true;
            on_boundary[b] = true;
        }
        i += run;
    }
    (0..vertex_count).filter(|&v| on_boundary[v]).collect()
}

/// Two boundary vertices far apart, found by two farthest-point sweeps.
fn farthest_boundary_pair(vertices: &[Point3<f64>], boundary: &[usize]) -> (usize, usize) {
    let farthest_from = |from: usize| {
        boundary
            .iter()
            .copied()
            .fold((from, 0.0), |(best, best_dist), v| {
                let dist = (vertices[v] - vertices[from]).norm_squared();
                if dist > best_dist {
                    (v, dist)
                } else {
                    (best, best_dist)
                }
            })
            .0
    };
    let a = farthest_from(boundary[0]);
    let b = farthest_from(a);
    (a, b)
}

/// Build the reduced LSCM normal equations over the free vertices.
///
/// Unknown `k` is the U of free vertex `k`, unknown `free_count + k` its V.
/// Terms coupling a free unknown to a pinned one move to the right-hand side.
fn build_lscm_system(
    vertices: &[Point3<f64>],
    faces: &[[usize; 3]],
    free_index: &[Option<usize>],
    free_count: usize,
    coords: &[Point2<f64>],
) -> (CsrMatrix, DVector<f64>) {
    let m = free_count;
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(faces.len() * 36);
    let mut rhs = DVector::zeros(2 * m);

    // (vertex, is_v) -> reduced unknown, or the pinned value.
    let unknown = |v: usize, is_v: bool| -> std::result::Result<usize, f64> {
        match free_index[v] {
            Some(k) => Ok(if is_v { m + k } else { k }),
            None => Err(if is_v { coords[v].y } else { coords[v].x }),
        }
    };

    for face in faces {
        let [i, j, k] = *face;
        // Skip zero-area triangles; they carry no angle to preserve.
        let Some(local) = local_frame(&vertices[i], &vertices[j], &vertices[k]) else {
            continue;
        };

        // Local 2D coordinates: qi at the origin, qj on the x axis.
        let (qjx, qjy) = (local[(0, 0)], 0.0);
        let (qkx, qky) = (local[(0, 1)], local[(1, 1)]);
        let area = 0.5 * qjx * qky;
        let inv_2a = 1.0 / (2.0 * area);

        // Gradient of the linear hat function at each corner.
        let grads = [
            (i, (qjy - qky) * inv_2a, (qkx - qjx) * inv_2a),
            (j, qky * inv_2a, -qkx * inv_2a),
            (k, -qjy * inv_2a, qjx * inv_2a),
        ];

        for &(vi, ax_i, ay_i) in &grads {
            for &(vj, ax_j, ay_j) in &grads {
                let uu = (ax_i * ax_j + ay_i * ay_j) * area;
                let uv = (ay_i * ax_j - ax_i * ay_j) * area;

                // (row unknown, col unknown, value) for the u-u, v-v, u-v and v-u blocks.
                for (row_v, col_v, value) in [
                    (false, false, uu),
                    (true, true, uu),
                    (false, true, uv),
                    (true, false, -uv),
                ] {
                    let Ok(row) = unknown(vi, row_v) else {
                        continue;
                    };
                    match unknown(vj, col_v) {
                        Ok(col) => triplets.push((row, col, value)),
                        Err(pinned) => rhs[row] -= value * pinned,
                    }
                }
            }
        }
    }

    (CsrMatrix::from_triplets(2 * m, 2 * m, triplets), rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilted_triangle() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(0.5, 1.5, 0.5),
        ];
        (vertices, vec![[0, 1, 2]])
    }

    /// A raised hexagonal fan around vertex 0.
    fn cone() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let mut vertices = vec![Point3::new(0.0, 0.0, 0.4)];
        vertices.extend((0..6).map(|k| {
            let angle = k as f64 * std::f64::consts::FRAC_PI_3;
            Point3::new(angle.cos(), angle.sin(), 0.0)
        }));
        let faces = (0..6).map(|k| [0, 1 + k, 1 + (k + 1) % 6]).collect();
        (vertices, faces)
    }

    /// An `n` x `n` cell grid, optionally folded along x = n / 2.
    fn grid(n: usize, fold: f64) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let half = n as f64 / 2.0;
        let row = n + 1;
        let vertices = (0..row * row)
            .map(|k| {
                let (x, y) = ((k % row) as f64, (k / row) as f64);
                let d = (x - half).max(0.0);
                Point3::new(x.min(half) + d * fold.cos(), y, d * fold.sin())
            })
            .collect();
        let faces = (0..n * n)
            .flat_map(|cell| {
                let corner = cell / n * row + cell % n;
                [
                    [corner, corner + 1, corner + row + 1],
                    [corner, corner + row + 1, corner + row],
                ]
            })
            .collect();
        (vertices, faces)
    }

    #[test]
    fn test_triangle_keeps_its_shape() {
        let (vertices, faces) = tilted_triangle();
        let uvs = lscm(&vertices, &faces, &LSCMOptions::default()).unwrap();

        assert!(uvs.max_stretch(&vertices, &faces) < 1e-9);
        assert!(uvs.signed_area(&faces[0]) > 0.0);
    }

    #[test]
    fn test_cone_flattens_without_folds() {
        let (vertices, faces) = cone();
        let uvs = lscm(&vertices, &faces, &LSCMOptions::default()).unwrap();

        assert_eq!(uvs.len(), 7);
        assert_eq!(uvs.orientation(&faces, &[false; 6]), Some(1.0));
    }

    #[test]
    fn test_flat_grid_keeps_projection() {
        let (vertices, faces) = grid(3, 0.0);
        let normal = average_normal(&vertices, &faces).unwrap();
        let initial = planar_projection(&vertices, &normal);

        let uvs = lscm_from(&vertices, &faces, &initial, &LSCMOptions::default()).unwrap();

        for ((_, a), (_, b)) in uvs.iter().zip(initial.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn test_unfolds_developable_fold() {
        let (vertices, faces) = grid(4, 0.6);
        let normal = average_normal(&vertices, &faces).unwrap();
        let projected = planar_projection(&vertices, &normal);
        assert!(projected.max_stretch(&vertices, &faces) > 0.01);

        let uvs = lscm(&vertices, &faces, &LSCMOptions::default()).unwrap();
        assert!(uvs.max_stretch(&vertices, &faces) < 1e-4);
        assert_eq!(uvs.orientation(&faces, &vec![false; faces.len()]), Some(1.0));
    }

    #[test]
    fn test_closed_chart_has_no_pins() {
        let vertices = [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ];
        let faces = [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]];

        let err = lscm_from(&vertices, &faces, &UVMap::zeros(4), &LSCMOptions::default()).unwrap_err();
        assert!(matches!(err, AtlasError::DegenerateMesh(_)));
    }

    #[test]
    fn test_manual_pins_fix_similarity() {
        let (vertices, faces) = grid(2, 0.0);
        let options = LSCMOptions::with_pins(PinnedVertex::new(0, 0.0, 0.0), PinnedVertex::new(2, 1.0, 0.0));

        let uvs = lscm(&vertices, &faces, &options).unwrap();

        assert_eq!(uvs.get(0), Point2::new(0.0, 0.0));
        assert_eq!(uvs.get(2), Point2::new(1.0, 0.0));
        // The far corner lands where a similarity of the grid would put it.
        let far = uvs.get(8);
        assert!((far - Point2::new(1.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_pins() {
        let (vertices, faces) = tilted_triangle();

        let same = LSCMOptions::with_pins(PinnedVertex::new(1, 0.0, 0.0), PinnedVertex::new(1, 1.0, 0.0));
        assert!(matches!(
            lscm(&vertices, &faces, &same),
            Err(AtlasError::InvalidParameter { .. })
        ));

        let out_of_range =
            LSCMOptions::with_pins(PinnedVertex::new(0, 0.0, 0.0), PinnedVertex::new(7, 1.0, 0.0));
        assert!(matches!(
            lscm(&vertices, &faces, &out_of_range),
            Err(AtlasError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_boundary_vertices() {
        assert_eq!(boundary_vertices(&[[0, 1, 2]], 4), vec![0, 1, 2]);

        let (_, faces) = cone();
        assert_eq!(boundary_vertices(&faces, 7), vec![1, 2, 3, 4, 5, 6]);

        let (_, faces) = grid(2, 0.0);
        assert_eq!(boundary_vertices(&faces, 9), vec![0, 1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn test_farthest_boundary_pair() {
        let vertices = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let (a, b) = farthest_boundary_pair(&vertices, &[0, 1, 2, 3]);
        assert_eq!((a, b), (3, 0));
    }
}
