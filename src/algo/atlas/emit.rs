//! Vertex instance emission.
//!
//! Every mesh vertex keeps its own index as the instance for the first chart
//! that uses it (in face/corner order). Each further chart touching the vertex
//! gets a fresh instance appended after the mesh vertices, so instance ids
//! depend only on face order.

use std::collections::HashMap;

use super::charts::Charts;
use super::flatten::FlatChart;
use crate::error::{AtlasError, Result};
use crate::mesh::{ChartId, MeshBuffer, INVALID_INDEX};

/// Per-instance buffers plus the rewritten triangle list.
#[derive(Debug, Clone, Default)]
pub(crate) struct Instances {
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub vertex_remap: Vec<u32>,
    pub instance_charts: Vec<ChartId>,
}

/// Emit vertex instances from flattened charts holding canvas UVs.
///
/// Chart-local corners are mapped back to mesh vertices through
/// [`FlatChart::vertices`]. UVs are copied as they are; range checks belong
/// to the caller.
pub(crate) fn emit_instances(
    mesh: &MeshBuffer,
    grown: &Charts,
    flat: &[FlatChart],
) -> Result<Instances> {
    let vertex_count = mesh.vertex_count();

    // Position of every face inside its chart's face list.
    let mut face_slot = vec![0usize; mesh.face_count()];
    for chart in &grown.charts {
        for (slot, f) in chart.faces.iter().enumerate() {
            face_slot[f.index()] = slot;
        }
    }

    let mut home = vec![ChartId::invalid(); vertex_count];
    for (f, tri) in mesh.triangles().iter().enumerate() {
        for &v in tri {
            if !home[v as usize].is_valid() {
                home[v as usize] = grown.face_charts[f];
            }
        }
    }

    let mut out = Instances::default();
    out.uvs.try_reserve_exact(vertex_count)?;
    out.vertex_remap.try_reserve_exact(vertex_count)?;
    out.instance_charts.try_reserve_exact(vertex_count)?;
    out.indices.try_reserve_exact(mesh.face_count() * 3)?;

    out.uvs.resize(vertex_count, [0.0, 0.0]);
    out.vertex_remap.extend(0..vertex_count as u32);
    out.instance_charts.extend_from_slice(&home);

    let mut extra: HashMap<(u32, ChartId), u32> = HashMap::new();
    for f in mesh.face_ids() {
        let chart = grown.face_charts[f.index()];
        let flat_chart = &flat[chart.index()];
        let local = flat_chart.faces[face_slot[f.index()]];

        for &corner in &local {
            let v = flat_chart.vertices[corner].raw();
            let p = flat_chart.uv.get(corner);
            let uv = [p.x as f32, p.y as f32];
            let instance = if home[v as usize] == chart {
                out.uvs[v as usize] = uv;
                v
            } else {
                match extra.get(&(v, chart)) {
                    Some(&instance) => instance,
                    None => {
                        let instance = u32::try_from(out.uvs.len())
                            .ok()
                            .filter(|&i| i != INVALID_INDEX)
                            .ok_or(AtlasError::FaceCountOverflow {
                                faces: mesh.face_count(),
                            })?;
                        out.uvs.push(uv);
                        out.vertex_remap.push(v);
                        out.instance_charts.push(chart);
                        extra.insert((v, chart), instance);
                        instance
                    }
                }
            };
            out.indices.push(instance);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use nalgebra::Point2;

    use super::*;
    use crate::algo::atlas::charts::Chart;
    use crate::algo::parameterize::UVMap;
    use crate::mesh::{FaceId, VertexId};

    fn chart(face: usize) -> Chart {
        Chart {
            faces: vec![FaceId::new(face)],
            normal: None,
            area: 0.5,
        }
    }

    fn flat(vertices: [usize; 3], face: [usize; 3], uv: [[f64; 2]; 3]) -> FlatChart {
        FlatChart {
            vertices: vertices.iter().map(|&v| VertexId::new(v)).collect(),
            faces: vec![face],
            uv: UVMap::new(uv.iter().map(|p| Point2::new(p[0], p[1])).collect()),
            area: 0.5,
            stretch: 0.0,
        }
    }

    /// Two triangles hinged on the edge 0-1, one chart each. The charts
    /// number their vertices in an order unrelated to the mesh, and the
    /// second one reaches past the unit square.
    fn hinge() -> (MeshBuffer, Charts, Vec<FlatChart>) {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mesh = MeshBuffer::create(&positions, &[0, 1, 2, 1, 0, 3]).unwrap();
        let grown = Charts {
            charts: vec![chart(0), chart(1)],
            face_charts: vec![ChartId::new(0), ChartId::new(1)],
        };
        let flat = vec![
            flat([2, 0, 1], [1, 2, 0], [[0.1, 0.9], [0.1, 0.1], [0.4, 0.1]]),
            flat([1, 0, 3], [0, 1, 2], [[0.6, 0.1], [0.9, 0.1], [1.5, 0.5]]),
        ];
        (mesh, grown, flat)
    }

    #[test]
    fn test_local_vertices_map_to_mesh() {
        let (mesh, grown, flat) = hinge();
        let out = emit_instances(&mesh, &grown, &flat).unwrap();

        assert_eq!(out.indices, vec![0, 1, 2, 4, 5, 3]);
        assert_eq!(out.vertex_remap, vec![0, 1, 2, 3, 1, 0]);
        assert_eq!(out.uvs[0], [0.1, 0.1]);
        assert_eq!(out.uvs[2], [0.1, 0.9]);
        assert_eq!(out.uvs[4], [0.6, 0.1]);
        assert_eq!(out.uvs[5], [0.9, 0.1]);
        assert_eq!(
            out.instance_charts,
            vec![
                ChartId::new(0),
                ChartId::new(0),
                ChartId::new(0),
                ChartId::new(1),
                ChartId::new(1),
                ChartId::new(1)
            ]
        );
    }

    #[test]
    fn test_out_of_range_uv_is_kept() {
        let (mesh, grown, flat) = hinge();
        let out = emit_instances(&mesh, &grown, &flat).unwrap();
        assert_eq!(out.uvs[3], [1.5, 0.5]);
    }
}
