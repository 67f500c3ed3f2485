//! Mesh storage and topology.
//!
//! This module holds the flat triangle mesh and everything that reasons about
//! its connectivity before charting.
//!
//! # Overview
//!
//! - [`MeshBuffer`] owns positions and triangles. It only ever grows.
//! - [`AdjacencyTable`] records, per triangle edge, the triangle across it.
//! - [`clean`] splits bowtie vertices and returns a [`DuplicationRecord`].
//! - [`validate`] collects a [`ValidationReport`] of suspicious topology.
//!
//! # Index Types
//!
//! Elements are addressed by [`VertexId`], [`FaceId`] and [`ChartId`], thin
//! `u32` wrappers. Appending vertices never invalidates an existing id.
//!
//! ```
//! use tessera::mesh::{clean, AdjacencyTable, MeshBuffer};
//!
//! let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let mut mesh = MeshBuffer::create(&positions, &[0, 1, 2]).unwrap();
//! let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
//! let record = clean(&mut mesh, &adjacency, true).unwrap();
//! assert!(record.is_empty());
//! ```

mod adjacency;
mod buffer;
mod clean;
mod index;
mod validate;

pub use adjacency::{build_adjacency, AdjacencyOptions, AdjacencyTable, ManifoldViolation};
pub use buffer::MeshBuffer;
pub use clean::{clean, find_bowties, Bowtie, DuplicationRecord};
pub use index::{ChartId, FaceId, VertexId, INVALID_INDEX};
pub use validate::{validate, ValidateOptions, ValidationReport};
