//! Chart-local UV coordinates and the measurements taken on them.

use nalgebra::{Matrix2, Point2, Point3, Rotation2, Vector2};

/// UV coordinates for the vertices of one chart.
///
/// Coordinates are indexed by chart-local vertex index and carry no fixed
/// scale or offset until the packer places the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct UVMap {
    coords: Vec<Point2<f64>>,
}

impl UVMap {
    /// Wrap per-vertex coordinates.
    pub fn new(coords: Vec<Point2<f64>>) -> Self {
        Self { coords }
    }

    /// `n` coordinates at the origin.
    pub fn zeros(n: usize) -> Self {
        Self {
            coords: vec![Point2::origin(); n],
        }
    }

    /// Coordinate of chart vertex `v`.
    #[inline]
    pub fn get(&self, v: usize) -> Point2<f64> {
        self.coords[v]
    }

    /// Move chart vertex `v` to `uv`.
    #[inline]
    pub fn set(&mut self, v: usize, uv: Point2<f64>) {
        self.coords[v] = uv;
    }

    /// Number of chart vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether the chart has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// `(vertex, uv)` pairs in vertex order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Point2<f64>)> + '_ {
        self.coords.iter().copied().enumerate()
    }

    /// All coordinates, indexed by chart vertex.
    pub fn as_slice(&self) -> &[Point2<f64>] {
        &self.coords
    }

    /// Axis-aligned `(min, max)` corners, `None` for an empty map.
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = *self.coords.first()?;
        Some(self.coords.iter().fold((first, first), |(min, max), uv| {
            (
                Point2::new(min.x.min(uv.x), min.y.min(uv.y)),
                Point2::new(max.x.max(uv.x), max.y.max(uv.y)),
            )
        }))
    }

    /// Rotate by `angle` radians about the origin, then scale uniformly.
    pub fn rotate_scale(&mut self, angle: f64, scale: f64) {
        let rot = Rotation2::new(angle);
        for uv in &mut self.coords {
            *uv = Point2::from(rot * uv.coords * scale);
        }
    }

    /// Shift every coordinate.
    pub fn translate(&mut self, offset: Vector2<f64>) {
        for uv in &mut self.coords {
            *uv += offset;
        }
    }

    /// Mirror the map across the v axis (flips orientation).
    pub fn mirror(&mut self) {
        for uv in &mut self.coords {
            uv.x = -uv.x;
        }
    }

    /// Signed area of a triangle in UV space (positive when counter-clockwise).
    #[inline]
    pub fn signed_area(&self, face: &[usize; 3]) -> f64 {
        let p0 = self.coords[face[0]];
        let e1 = self.coords[face[1]] - p0;
        let e2 = self.coords[face[2]] - p0;
        0.5 * (e1.x * e2.y - e2.x * e1.y)
    }

    /// Compute the total unsigned area in UV space.
    pub fn total_area(&self, faces: &[[usize; 3]]) -> f64 {
        faces.iter().map(|f| self.signed_area(f).abs()).sum()
    }

    /// Whether every face keeps the sign of its UV area.
    ///
    /// Faces listed in `skip` (degenerate in 3D) are ignored. Returns the sign
    /// (`1.0` or `-1.0`) shared by all remaining faces, or `None` on a flip.
    pub fn orientation(&self, faces: &[[usize; 3]], skip: &[bool]) -> Option<f64> {
        let mut sign = 0.0;
        for (face, _) in faces.iter().zip(skip).filter(|&(_, &s)| !s) {
            let area = self.signed_area(face);
            if area == 0.0 || !area.is_finite() {
                return None;
            }
            let s = area.signum();
            if sign == 0.0 {
                sign = s;
            } else if s != sign {
                return None;
            }
        }
        Some(if sign == 0.0 { 1.0 } else { sign })
    }

    /// Worst per-face stretch against the 3D positions.
    ///
    /// Face stretch is `1 - σ_min / σ_max` for the singular values of the
    /// linear map taking the 3D triangle onto its UV triangle: 0 for a
    /// similarity, approaching 1 as the map collapses a direction.
    pub fn max_stretch(&self, positions: &[Point3<f64>], faces: &[[usize; 3]]) -> f64 {
        faces
            .iter()
            .filter_map(|f| {
                let local = local_frame(&positions[f[0]], &positions[f[1]], &positions[f[2]])?;
                let uv = Matrix2::from_columns(&[
                    self.coords[f[1]] - self.coords[f[0]],
                    self.coords[f[2]] - self.coords[f[0]],
                ]);
                let jacobian = uv * local.try_inverse()?;
                Some(stretch_of(&jacobian))
            })
            .fold(0.0, f64::max)
    }
}

/// Triangle edges expressed in an orthonormal frame of its own plane.
///
/// Columns are `p1 - p0` and `p2 - p0`. `None` for a degenerate triangle.
pub(crate) fn local_frame(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
) -> Option<Matrix2<f64>> {
    let e1 = p1 - p0;
    let e2 = p2 - p0;
    let e1_len = e1.norm();
    let normal = e1.cross(&e2);
    if e1_len < 1e-12 || normal.norm() < 1e-12 * e1_len * e1_len {
        return None;
    }
    let x_axis = e1 / e1_len;
    let y_axis = normal.cross(&e1).normalize();
    Some(Matrix2::new(e1_len, e2.dot(&x_axis), 0.0, e2.dot(&y_axis)))
}

fn stretch_of(m: &Matrix2<f64>) -> f64 {
    let energy = 0.5 * m.norm_squared();
    let det = m.determinant().abs();
    let spread = (energy * energy - det * det).max(0.0).sqrt();
    let s_max = (energy + spread).sqrt();
    let s_min = (energy - spread).max(0.0).sqrt();
    if s_max <= 0.0 {
        return 1.0;
    }
    1.0 - s_min / s_max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> UVMap {
        UVMap::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
        ])
    }

    #[test]
    fn test_uv_map_basic() {
        let uv_map = unit_triangle();
        assert_eq!(uv_map.len(), 3);
        assert!(!uv_map.is_empty());
        assert_eq!(uv_map.get(1), Point2::new(1.0, 0.0));
        assert_eq!(UVMap::zeros(2).get(1), Point2::origin());
    }

    #[test]
    fn test_uv_map_bounding_box() {
        let uv_map = UVMap::new(vec![
            Point2::new(-1.0, 0.5),
            Point2::new(2.0, -0.5),
            Point2::new(0.5, 3.0),
        ]);

        let (min, max) = uv_map.bounding_box().unwrap();
        assert_eq!(min, Point2::new(-1.0, -0.5));
        assert_eq!(max, Point2::new(2.0, 3.0));
        assert!(UVMap::zeros(0).bounding_box().is_none());
    }

    #[test]
    fn test_signed_area_and_mirror() {
        let mut uv_map = unit_triangle();
        assert!((uv_map.signed_area(&[0, 1, 2]) - 0.5).abs() < 1e-12);
        assert!((uv_map.total_area(&[[0, 1, 2]]) - 0.5).abs() < 1e-12);

        uv_map.mirror();
        assert!((uv_map.signed_area(&[0, 1, 2]) + 0.5).abs() < 1e-12);
        assert_eq!(uv_map.orientation(&[[0, 1, 2]], &[false]), Some(-1.0));
    }

    #[test]
    fn test_orientation_detects_flip() {
        let uv_map = UVMap::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(0.5, 0.2),
        ]);
        // Second face folds back over the first.
        let faces = [[0, 1, 2], [1, 0, 3]];
        assert_eq!(uv_map.orientation(&faces, &[false, false]), None);
        assert_eq!(uv_map.orientation(&faces, &[false, true]), Some(1.0));
    }

    #[test]
    fn test_rotate_scale_translate() {
        let mut uv_map = unit_triangle();
        uv_map.rotate_scale(std::f64::consts::FRAC_PI_2, 2.0);
        uv_map.translate(Vector2::new(1.0, 1.0));

        let p = uv_map.get(1);
        assert!((p.x - 1.0).abs() < 1e-12);
        assert!((p.y - 3.0).abs() < 1e-12);
        assert!((uv_map.total_area(&[[0, 1, 2]]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_stretch_of_similarity_is_zero() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mut uv_map = unit_triangle();
        uv_map.rotate_scale(0.3, 5.0);
        assert!(uv_map.max_stretch(&positions, &[[0, 1, 2]]) < 1e-9);
    }

    #[test]
    fn test_stretch_of_squash() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let uv_map = UVMap::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 0.5),
        ]);
        let stretch = uv_map.max_stretch(&positions, &[[0, 1, 2]]);
        assert!((stretch - 0.5).abs() < 1e-9);
    }
}
