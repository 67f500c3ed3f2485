//! Per-chart flattening.

use std::collections::HashMap;

use log::warn;

use super::charts::Chart;
use super::{AtlasFlags, AtlasOptions};
use crate::algo::parameterize::{lscm_from, planar_projection, UVMap};
use crate::mesh::{MeshBuffer, VertexId};

/// One chart flattened into its own UV space.
///
/// UVs are scaled so that UV area equals 3D area, which gives every chart
/// the same texel density once the packer applies one global scale.
#[derive(Debug, Clone)]
pub(crate) struct FlatChart {
    /// Mesh vertex of every chart-local vertex, in first-use order.
    pub vertices: Vec<VertexId>,
    /// Chart-local triangles, parallel to [`Chart::faces`].
    pub faces: Vec<[usize; 3]>,
    pub uv: UVMap,
    pub area: f64,
    pub stretch: f64,
}

/// Flatten a chart, preferring a conformal map over plain projection.
///
/// The conformal map is kept only when it is consistently oriented and no
/// more stretched than the projection; any solver failure falls back to the
/// projection, which growth guarantees to be fold-free.
pub(crate) fn flatten_chart(
    mesh: &MeshBuffer,
    chart: &Chart,
    index: usize,
    options: &AtlasOptions,
) -> FlatChart {
    let mut local: HashMap<u32, usize> = HashMap::with_capacity(chart.faces.len() + 2);
    let mut vertices: Vec<VertexId> = Vec::new();
    let faces: Vec<[usize; 3]> = chart
        .faces
        .iter()
        .map(|&f| {
            mesh.triangle(f).map(|v| {
                *local.entry(v).or_insert_with(|| {
                    vertices.push(VertexId::from_raw(v));
                    vertices.len() - 1
                })
            })
        })
        .collect();

    let Some(normal) = chart.normal else {
        // A degenerate face collapses to a point.
        return FlatChart {
            uv: UVMap::zeros(vertices.len()),
            vertices,
            faces,
            area: 0.0,
            stretch: 0.0,
        };
    };

    let positions: Vec<_> = vertices.iter().map(|&v| mesh.position_f64(v)).collect();
    let projected = planar_projection(&positions, &normal);
    let projected_stretch = projected.max_stretch(&positions, &faces);

    let (mut uv, stretch) = if options.flags.contains(AtlasFlags::FAST) {
        (projected, projected_stretch)
    } else {
        match lscm_from(&positions, &faces, &projected, &options.lscm) {
            Ok(mut conformal) => match conformal.orientation(&faces, &vec![false; faces.len()]) {
                Some(sign) => {
                    if sign < 0.0 {
                        conformal.mirror();
                    }
                    let conformal_stretch = conformal.max_stretch(&positions, &faces);
                    if conformal_stretch <= projected_stretch {
                        (conformal, conformal_stretch)
                    } else {
                        (projected, projected_stretch)
                    }
                }
                None => {
                    warn!("chart {}: conformal map folds over, using projection", index);
                    (projected, projected_stretch)
                }
            },
            Err(e) => {
                warn!("chart {}: conformal solve failed ({}), using projection", index, e);
                (projected, projected_stretch)
            }
        }
    };

    let uv_area = uv.total_area(&faces);
    if uv_area > 0.0 && chart.area > 0.0 {
        uv.rotate_scale(0.0, (chart.area / uv_area).sqrt());
    }

    FlatChart {
        vertices,
        faces,
        uv,
        area: chart.area,
        stretch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::atlas::charts::{face_geometry, grow_charts};
    use crate::mesh::AdjacencyTable;

    /// A strip of `n` unit squares bent upward by `angle` at every column.
    fn bent_strip(n: usize, angle: f64) -> MeshBuffer {
        let mut positions = Vec::new();
        let (mut x, mut z) = (0.0f64, 0.0f64);
        for i in 0..=n {
            positions.push([x as f32, 0.0, z as f32]);
            positions.push([x as f32, 1.0, z as f32]);
            let theta = angle * i as f64;
            x += theta.cos();
            z += theta.sin();
        }
        let mut indices = Vec::new();
        for i in 0..n as u32 {
            let (a, b, c, d) = (2 * i, 2 * i + 2, 2 * i + 3, 2 * i + 1);
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
        MeshBuffer::create(&positions, &indices).unwrap()
    }

    fn flatten_all(mesh: &MeshBuffer, options: &AtlasOptions) -> Vec<FlatChart> {
        let adjacency = AdjacencyTable::build(mesh, 0.0).unwrap();
        let geometry = face_geometry(mesh, &adjacency, false);
        let charts = grow_charts(&adjacency, &geometry, options.max_stretch, options.max_charts).unwrap();
        charts
            .charts
            .iter()
            .enumerate()
            .map(|(i, c)| flatten_chart(mesh, c, i, options))
            .collect()
    }

    #[test]
    fn test_flat_chart_has_no_stretch() {
        let mesh = bent_strip(3, 0.0);
        let flat = flatten_all(&mesh, &AtlasOptions::default());

        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].vertices.len(), 8);
        assert!(flat[0].stretch < 1e-9);
        assert!((flat[0].uv.total_area(&flat[0].faces) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_conformal_beats_projection_on_bend() {
        let mesh = bent_strip(4, 0.15);
        let options = AtlasOptions::default().with_max_stretch(0.5);

        let conformal = flatten_all(&mesh, &options);
        let projected = flatten_all(&mesh, &options.clone().with_flags(AtlasFlags::FAST));

        assert_eq!(conformal.len(), 1);
        assert!(projected[0].stretch > 0.01);
        assert!(conformal[0].stretch < projected[0].stretch);
        assert_eq!(
            conformal[0].uv.orientation(&conformal[0].faces, &[false; 8]),
            Some(1.0)
        );
    }

    #[test]
    fn test_degenerate_chart_collapses() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let mesh = MeshBuffer::create(&positions, &[0, 1, 2]).unwrap();
        let flat = flatten_all(&mesh, &AtlasOptions::default());

        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].area, 0.0);
        let (lo, hi) = flat[0].uv.bounding_box().unwrap();
        assert_eq!(lo, hi);
    }
}
