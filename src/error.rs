//! Error types for tessera.
//!
//! Every stage of the pipeline reports failures through [`AtlasError`]. The
//! orchestrator wraps the first failure in a [`PipelineError`] tagged with the
//! stage it came from.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result type alias using [`AtlasError`].
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Errors that can occur while cleaning or atlasing a mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AtlasError {
    /// The position or index array is empty.
    #[error("mesh input is empty")]
    EmptyInput,

    /// A face references a vertex that does not exist.
    #[error("face {face} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        /// The face index.
        face: usize,
        /// The offending vertex index.
        vertex: u32,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// The index count does not fit in 32 bits.
    #[error("{faces} faces exceed the 32-bit index range")]
    FaceCountOverflow {
        /// The requested face count.
        faces: usize,
    },

    /// The index array length is not a multiple of three.
    #[error("index buffer of length {len} does not hold whole triangles")]
    TruncatedIndexBuffer {
        /// Length of the index array.
        len: usize,
    },

    /// The mesh has nothing a stage can work on.
    #[error("degenerate mesh: {0}")]
    DegenerateMesh(String),

    /// A vertex position is NaN or infinite.
    #[error("vertex {vertex} has a non-finite position")]
    NonFinitePosition {
        /// The vertex index.
        vertex: usize,
    },

    /// Chart growth needed more charts than allowed.
    #[error("mesh needs more than {max_charts} charts at the requested stretch")]
    ChartBudgetExceeded {
        /// The chart budget that was exceeded.
        max_charts: usize,
    },

    /// The charts do not fit on the canvas.
    #[error("cannot pack {charts} charts into a {width}x{height} canvas")]
    PackingFailed {
        /// Number of charts that had to be placed.
        charts: usize,
        /// Canvas width in pixels.
        width: u32,
        /// Canvas height in pixels.
        height: u32,
    },

    /// A buffer allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// Iterative solver failed to converge.
    #[error("solver failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// A stage was handed data in an inconsistent state.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),
}

impl AtlasError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        AtlasError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Stable numeric reason code. Zero is reserved for success.
    pub fn reason_code(&self) -> u32 {
        match self {
            AtlasError::EmptyInput => 1,
            AtlasError::IndexOutOfRange { .. } => 2,
            AtlasError::FaceCountOverflow { .. } => 3,
            AtlasError::TruncatedIndexBuffer { .. } => 4,
            AtlasError::DegenerateMesh(_) => 5,
            AtlasError::NonFinitePosition { .. } => 6,
            AtlasError::ChartBudgetExceeded { .. } => 7,
            AtlasError::PackingFailed { .. } => 8,
            AtlasError::OutOfMemory => 9,
            AtlasError::ConvergenceFailed { .. } => 10,
            AtlasError::InvalidParameter { .. } => 11,
            AtlasError::InvalidState(_) => 12,
        }
    }

    /// Whether retrying with relaxed parameters can succeed.
    ///
    /// Only chart budget and packing failures qualify: a larger `max_charts`,
    /// a larger canvas or a looser `max_stretch` may let the same mesh through.
    /// Everything else means the input itself has to change.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AtlasError::ChartBudgetExceeded { .. } | AtlasError::PackingFailed { .. }
        )
    }
}

impl From<TryReserveError> for AtlasError {
    fn from(_: TryReserveError) -> Self {
        AtlasError::OutOfMemory
    }
}

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Building the mesh buffer from caller arrays.
    Mesh,
    /// Validating the mesh buffer.
    Validate,
    /// Building (or rebuilding) the adjacency table.
    Adjacency,
    /// Topology cleaning.
    Clean,
    /// Chart generation, parameterization and packing.
    Atlas,
}

impl Stage {
    /// Stage name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Mesh => "mesh",
            Stage::Validate => "validate",
            Stage::Adjacency => "adjacency",
            Stage::Clean => "clean",
            Stage::Atlas => "atlas",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The first failure of a pipeline run, tagged with its stage.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// Stage that failed.
    pub stage: Stage,
    /// The unchanged stage error.
    #[source]
    pub source: AtlasError,
}

impl PipelineError {
    /// Tag an error with a stage.
    pub fn new(stage: Stage, source: AtlasError) -> Self {
        Self { stage, source }
    }

    /// Reason code of the underlying error.
    pub fn reason_code(&self) -> u32 {
        self.source.reason_code()
    }

    /// See [`AtlasError::is_recoverable`].
    pub fn is_recoverable(&self) -> bool {
        self.source.is_recoverable()
    }
}
