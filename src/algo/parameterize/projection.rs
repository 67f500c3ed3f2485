//! Orthogonal projection onto a plane.
//!
//! The cheapest flattening there is. For a chart whose face normals all lie
//! strictly on one side of the projection plane it is locally injective, which
//! is what makes it a safe starting point and fallback for LSCM.

use nalgebra::{Point2, Point3, Unit, Vector3};

use super::uv::UVMap;

/// Area-weighted average normal of a set of triangles.
///
/// Returns `None` when the normals cancel out (or there is no area).
pub fn average_normal(positions: &[Point3<f64>], faces: &[[usize; 3]]) -> Option<Unit<Vector3<f64>>> {
    let sum: Vector3<f64> = faces
        .iter()
        .map(|f| (positions[f[1]] - positions[f[0]]).cross(&(positions[f[2]] - positions[f[0]])))
        .sum();
    Unit::try_new(sum, 1e-300)
}

/// An orthonormal tangent pair `(t, b)` with `t × b = normal`.
pub fn tangent_frame(normal: &Unit<Vector3<f64>>) -> (Vector3<f64>, Vector3<f64>) {
    let n = normal.as_ref();
    // Cross with the axis least aligned with the normal.
    let axis = if n.x.abs() <= n.y.abs() && n.x.abs() <= n.z.abs() {
        Vector3::x()
    } else if n.y.abs() <= n.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let t = n.cross(&axis).normalize();
    let b = n.cross(&t);
    (t, b)
}

/// Project positions onto the plane through the origin with the given normal.
///
/// Triangles whose normal points along `normal` come out counter-clockwise.
pub fn planar_projection(positions: &[Point3<f64>], normal: &Unit<Vector3<f64>>) -> UVMap {
    let (t, b) = tangent_frame(normal);
    UVMap::new(
        positions
            .iter()
            .map(|p| Point2::new(p.coords.dot(&t), p.coords.dot(&b)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tangent_frame_is_right_handed() {
        for n in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 2.0, -3.0),
            Vector3::new(-1.0, 0.0, 0.0),
        ] {
            let normal = Unit::new_normalize(n);
            let (t, b) = tangent_frame(&normal);
            assert!(t.dot(&b).abs() < 1e-12);
            assert!((t.norm() - 1.0).abs() < 1e-12);
            assert!((t.cross(&b) - normal.into_inner()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_projection_keeps_orientation() {
        let positions = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.2),
            Point3::new(0.0, 1.0, 0.9),
        ];
        let faces = [[0, 1, 2]];
        let normal = average_normal(&positions, &faces).unwrap();
        let uv = planar_projection(&positions, &normal);
        assert!(uv.signed_area(&faces[0]) > 0.0);
    }

    #[test]
    fn test_average_normal_cancels() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(average_normal(&positions, &[[0, 1, 2], [0, 2, 1]]).is_none());
    }
}
