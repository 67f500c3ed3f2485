//! Mesh validation.
//!
//! [`validate`] inspects a mesh (and optionally its adjacency) and collects
//! everything a later stage might trip over. Findings are data, not errors:
//! the caller decides which of them are fatal.

use super::adjacency::AdjacencyTable;
use super::buffer::MeshBuffer;
use super::clean::find_bowties;
use super::index::{FaceId, VertexId, INVALID_INDEX};
use crate::error::Result;

/// Which checks [`validate`] runs.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Report triangles with a repeated index or zero area.
    pub degenerate_faces: bool,
    /// Report vertices no triangle references.
    pub unused_vertices: bool,
    /// Report bowtie vertices (needs adjacency).
    pub bowties: bool,
    /// Report one-sided neighbour links and shared-edge violations (needs adjacency).
    pub adjacency: bool,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            degenerate_faces: true,
            unused_vertices: true,
            bowties: true,
            adjacency: true,
        }
    }
}

impl ValidateOptions {
    /// Only the checks that need no adjacency.
    pub fn geometry_only() -> Self {
        Self {
            bowties: false,
            adjacency: false,
            ..Self::default()
        }
    }
}

/// Findings of a [`validate`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Vertices whose position is NaN or infinite.
    pub non_finite_vertices: Vec<VertexId>,
    /// Triangles with a repeated index or zero area.
    pub degenerate_faces: Vec<FaceId>,
    /// Vertices no triangle references.
    pub unused_vertices: Vec<VertexId>,
    /// Bowtie vertices.
    pub bowties: Vec<VertexId>,
    /// Faces whose neighbour does not link back.
    pub asymmetric_faces: Vec<FaceId>,
    /// Number of edges shared by more than two faces.
    pub manifold_violations: usize,
    /// One line per finding.
    pub messages: Vec<String>,
}

impl ValidationReport {
    /// Whether nothing was found.
    pub fn is_clean(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Validate a mesh.
///
/// Checks needing adjacency are skipped when `adjacency` is `None`.
///
/// # Errors
///
/// Propagates errors from bowtie detection (empty mesh, stale adjacency).
///
/// # Example
///
/// ```
/// use tessera::mesh::{validate, MeshBuffer, ValidateOptions};
///
/// let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [9.0, 9.0, 9.0]];
/// let mesh = MeshBuffer::create(&positions, &[0, 1, 2]).unwrap();
///
/// let report = validate(&mesh, None, &ValidateOptions::default()).unwrap();
/// assert_eq!(report.degenerate_faces.len(), 1);
/// assert_eq!(report.unused_vertices.len(), 1);
/// ```
pub fn validate(
    mesh: &MeshBuffer,
    adjacency: Option<&AdjacencyTable>,
    options: &ValidateOptions,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    for (i, p) in mesh.positions().iter().enumerate() {
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            report.non_finite_vertices.push(VertexId::new(i));
            report.messages.push(format!("vertex {} has a non-finite position", i));
        }
    }

    if options.degenerate_faces {
        for f in mesh.face_ids() {
            if mesh.face_normal(f).is_none() {
                report.degenerate_faces.push(f);
                report.messages.push(format!("face {} is degenerate", f.index()));
            }
        }
    }

    if options.unused_vertices {
        let mut used = vec![false; mesh.vertex_count()];
        for &v in mesh.triangles().iter().flatten() {
            used[v as usize] = true;
        }
        for (i, _) in used.iter().enumerate().filter(|&(_, &u)| !u) {
            report.unused_vertices.push(VertexId::new(i));
            report.messages.push(format!("vertex {} is not referenced", i));
        }
    }

    if let Some(adjacency) = adjacency {
        if options.bowties {
            for bowtie in find_bowties(mesh, adjacency)? {
                report.messages.push(format!(
                    "vertex {} is a bowtie with {} fans",
                    bowtie.vertex.index(),
                    bowtie.fans.len()
                ));
                report.bowties.push(bowtie.vertex);
            }
        }

        if options.adjacency {
            for f in mesh.face_ids() {
                let links_back = adjacency.neighbors(f).iter().all(|&n| {
                    n == INVALID_INDEX || adjacency.neighbors(FaceId::from_raw(n)).contains(&f.raw())
                });
                if !links_back {
                    report.asymmetric_faces.push(f);
                    report
                        .messages
                        .push(format!("face {} has a one-sided neighbour link", f.index()));
                }
            }

            report.manifold_violations = adjacency.violations().len();
            for violation in adjacency.violations() {
                report.messages.push(format!(
                    "edge ({}, {}) is shared by {} faces",
                    violation.edge.0.index(),
                    violation.edge.1.index(),
                    violation.faces.len()
                ));
            }
        }
    }

    Ok(report)
}
