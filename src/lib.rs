//! # Tessera
//!
//! Topology cleaning and texture atlas generation for triangle meshes.
//!
//! Tessera takes a plain triangle mesh, typically the output of a surface
//! reconstruction step, and prepares it for texturing: it welds coincident
//! positions into an adjacency table, splits non-manifold "bowtie" vertices,
//! partitions the faces into charts, flattens each chart and packs all charts
//! into a pixel canvas without overlap.
//!
//! ## Features
//!
//! - **Index-stable mesh buffer**: vertices are only ever appended
//! - **Welding adjacency**: spatial-hash position matching within an epsilon
//! - **Bowtie splitting**: deterministic fan partitioning with a duplication record
//! - **Conformal charts**: LSCM flattening with a projection fallback
//! - **Gutter-aware packing**: every chart is at least `gutter` pixels from the next
//!
//! ## Quick Start
//!
//! ```
//! use tessera::prelude::*;
//!
//! // A unit square made of two triangles
//! let positions = [
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [1.0, 1.0, 0.0],
//!     [0.0, 1.0, 0.0],
//! ];
//! let indices = [0, 1, 2, 0, 2, 3];
//!
//! let params = AtlasParams::default().with_size(256, 256);
//! let result = prepare_and_atlas(&positions, &indices, &params).unwrap();
//!
//! assert_eq!(result.atlas.chart_count, 1);
//! for (instance, uv) in result.uvs().iter().enumerate() {
//!     let vertex = result.vertex_remap()[instance];
//!     println!("instance {} (vertex {}): u={:.3}, v={:.3}", instance, vertex, uv[0], uv[1]);
//! }
//! ```
//!
//! ## Running Stages Individually
//!
//! ```
//! use tessera::prelude::*;
//! use tessera::algo::atlas::{atlas, AtlasOptions};
//!
//! // Two triangles touching only at vertex 0
//! let positions = [
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [-1.0, 0.0, 0.0],
//!     [0.0, -1.0, 0.0],
//! ];
//! let mut mesh = MeshBuffer::create(&positions, &[0, 1, 2, 0, 3, 4]).unwrap();
//!
//! let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
//! let record = clean(&mut mesh, &adjacency, true).unwrap();
//! assert_eq!(record.len(), 1);
//!
//! // Cleaning grew the mesh, so adjacency has to be rebuilt.
//! let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
//! let output = atlas(&mesh, &adjacency, &AtlasOptions::default()).unwrap();
//! assert_eq!(output.chart_count, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;
pub mod pipeline;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use tessera::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{AtlasError, PipelineError, Result, Stage};
    pub use crate::mesh::{
        build_adjacency, clean, validate, AdjacencyOptions, AdjacencyTable, ChartId,
        DuplicationRecord, FaceId, MeshBuffer, VertexId,
    };
    pub use crate::pipeline::{prepare_and_atlas, AtlasParams, AtlasResult};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
