//! Chart growth.
//!
//! Charts are grown breadth-first over the adjacency graph from the lowest
//! unassigned face. A neighbour joins the current chart when its normal stays
//! within the deviation bound of both the chart's seed normal and the face it
//! was reached from; otherwise it is left for a later chart. Growth is a small
//! state machine (seeking a seed, growing a chart) that only moves forward, so
//! it always terminates and its result depends only on face order.

use std::collections::VecDeque;

use log::debug;
use nalgebra::{Unit, Vector3};
use rayon::prelude::*;

use crate::error::{AtlasError, Result};
use crate::mesh::{AdjacencyTable, ChartId, FaceId, MeshBuffer};

/// Largest normal deviation any chart may reach, whatever the caller's bound.
///
/// Keeps every chart inside an open hemisphere of normals, so the projection
/// along the seed normal never folds a triangle.
pub(crate) const MAX_NORMAL_DEVIATION: f64 = 0.9;

/// Unit normal and area of one face. `normal` is `None` for degenerate faces.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FaceGeometry {
    pub normal: Option<Unit<Vector3<f64>>>,
    pub area: f64,
}

/// A set of edge-connected faces sharing one parameterization.
#[derive(Debug, Clone)]
pub(crate) struct Chart {
    /// Faces in the order they joined the chart; the seed comes first.
    pub faces: Vec<FaceId>,
    /// The seed face's normal, or `None` for a single degenerate face.
    pub normal: Option<Unit<Vector3<f64>>>,
    /// Sum of the faces' 3D areas.
    pub area: f64,
}

/// Result of chart growth.
#[derive(Debug, Clone)]
pub(crate) struct Charts {
    pub charts: Vec<Chart>,
    /// Chart of every face.
    pub face_charts: Vec<ChartId>,
}

/// Compute per-face normals and areas.
pub(crate) fn face_geometry(
    mesh: &MeshBuffer,
    adjacency: &AdjacencyTable,
    parallel: bool,
) -> Vec<FaceGeometry> {
    let compute = |f: FaceId| {
        let normal = mesh.face_normal(f).filter(|_| !adjacency.is_degenerate(f));
        match normal {
            Some(n) => FaceGeometry {
                normal: Unit::try_new(n, 0.0),
                area: 0.5 * n.norm(),
            },
            None => FaceGeometry {
                normal: None,
                area: 0.0,
            },
        }
    };

    if parallel {
        (0..mesh.face_count())
            .into_par_iter()
            .map(|f| compute(FaceId::new(f)))
            .collect()
    } else {
        mesh.face_ids().map(compute).collect()
    }
}

enum Growth {
    /// Looking for the next unassigned face at or after `next`.
    Seeking { next: usize },
    /// Expanding `chart` from the faces queued in `frontier`.
    Growing {
        chart: Chart,
        frontier: VecDeque<FaceId>,
        next: usize,
    },
}

/// Partition all faces into charts.
///
/// `max_stretch` bounds `1 - n · n_seed` and `1 - n · n_from` for every face
/// normal `n` joining a chart; it is capped at [`MAX_NORMAL_DEVIATION`].
///
/// # Errors
///
/// [`AtlasError::ChartBudgetExceeded`] when a chart beyond `max_charts` would
/// be needed.
pub(crate) fn grow_charts(
    adjacency: &AdjacencyTable,
    geometry: &[FaceGeometry],
    max_stretch: f64,
    max_charts: usize,
) -> Result<Charts> {
    let bound = max_stretch.min(MAX_NORMAL_DEVIATION);
    let mut face_charts = vec![ChartId::invalid(); geometry.len()];
    let mut charts: Vec<Chart> = Vec::new();
    let mut state = Growth::Seeking { next: 0 };

    loop {
        state = match state {
            Growth::Seeking { next } => {
                let Some(seed) = (next..face_charts.len()).find(|&f| !face_charts[f].is_valid())
                else {
                    break;
                };
                if charts.len() >= max_charts {
                    debug!(
                        "chart budget of {} exhausted with {} faces unassigned",
                        max_charts,
                        face_charts.iter().filter(|c| !c.is_valid()).count()
                    );
                    return Err(AtlasError::ChartBudgetExceeded { max_charts });
                }

                face_charts[seed] = ChartId::new(charts.len());
                let chart = Chart {
                    faces: vec![FaceId::new(seed)],
                    normal: geometry[seed].normal,
                    area: geometry[seed].area,
                };
                if chart.normal.is_some() {
                    Growth::Growing {
                        chart,
                        frontier: VecDeque::from([FaceId::new(seed)]),
                        next: seed + 1,
                    }
                } else {
                    // Degenerate faces have no neighbours and close at once.
                    charts.push(chart);
                    Growth::Seeking { next: seed + 1 }
                }
            }
            Growth::Growing {
                mut chart,
                mut frontier,
                next,
            } => match (frontier.pop_front(), chart.normal) {
                (Some(from), Some(seed_normal)) => {
                    let id = ChartId::new(charts.len());
                    for edge in 0..3 {
                        let Some(candidate) = adjacency.neighbor(from, edge) else {
                            continue;
                        };
                        if face_charts[candidate.index()].is_valid() {
                            continue;
                        }
                        let from_normal = geometry[from.index()].normal;
                        if accepts(&geometry[candidate.index()], &seed_normal, from_normal, bound) {
                            face_charts[candidate.index()] = id;
                            chart.faces.push(candidate);
                            chart.area += geometry[candidate.index()].area;
                            frontier.push_back(candidate);
                        }
                    }
                    Growth::Growing {
                        chart,
                        frontier,
                        next,
                    }
                }
                _ => {
                    charts.push(chart);
                    Growth::Seeking { next }
                }
            },
        };
    }

    debug!(
        "grew {} charts over {} faces (normal deviation bound {:.4})",
        charts.len(),
        geometry.len(),
        bound
    );
    Ok(Charts {
        charts,
        face_charts,
    })
}

fn accepts(
    candidate: &FaceGeometry,
    seed_normal: &Unit<Vector3<f64>>,
    from_normal: Option<Unit<Vector3<f64>>>,
    bound: f64,
) -> bool {
    let (Some(n), Some(from)) = (candidate.normal, from_normal) else {
        return false;
    };
    1.0 - n.dot(seed_normal) <= bound && 1.0 - n.dot(&from) <= bound
}
