//! The full preparation pipeline.
//!
//! [`prepare_and_atlas`] takes caller arrays and runs every stage in order:
//!
//! 1. build the [`MeshBuffer`]
//! 2. validate it (non-finite positions and all-degenerate meshes are fatal)
//! 3. build adjacency with the welding epsilon
//! 4. clean bowties
//! 5. rebuild adjacency if cleaning added vertices
//! 6. generate the atlas
//!
//! The first failing stage ends the run. Its error comes back unchanged inside
//! a [`PipelineError`] naming the stage, and nothing else is returned.
//!
//! # Example
//!
//! ```
//! use tessera::pipeline::{prepare_and_atlas, AtlasParams};
//!
//! let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
//! let params = AtlasParams::default().with_max_charts(1);
//!
//! let result = prepare_and_atlas(&positions, &[0, 1, 2], &params).unwrap();
//! assert_eq!(result.atlas.chart_count, 1);
//! assert_eq!(result.vertex_remap(), &[0, 1, 2]);
//! ```

use log::{debug, info, warn};

use crate::algo::atlas::{atlas, AtlasFlags, AtlasOptions, AtlasOutput};
use crate::algo::parameterize::LSCMOptions;
use crate::algo::Progress;
use crate::error::{AtlasError, PipelineError, Stage};
use crate::mesh::{
    build_adjacency, clean, validate, AdjacencyOptions, DuplicationRecord, MeshBuffer,
    ValidateOptions, ValidationReport,
};

/// Result type of the pipeline entry points.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Number of progress steps the pipeline reports.
const STEPS: usize = 5;

/// Parameters for one pipeline run.
#[derive(Debug, Clone)]
pub struct AtlasParams {
    /// Most charts the atlas may use (at least 1).
    pub max_charts: usize,

    /// Largest normal deviation `1 - cos θ` inside a chart (positive).
    pub max_stretch: f64,

    /// Minimum spacing between charts, in canvas pixels.
    pub gutter: f64,

    /// Canvas width in pixels.
    pub width: u32,

    /// Canvas height in pixels.
    pub height: u32,

    /// Positions closer than this are welded for adjacency.
    pub adjacency_epsilon: f32,

    /// Whether to split bowtie vertices before charting (default: true).
    pub break_bowties: bool,

    /// Algorithm variant bits.
    pub flags: AtlasFlags,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Conformal solver settings.
    pub lscm: LSCMOptions,

    /// Progress reporter.
    pub progress: Progress,
}

impl Default for AtlasParams {
    fn default() -> Self {
        let atlas = AtlasOptions::default();
        Self {
            max_charts: atlas.max_charts,
            max_stretch: atlas.max_stretch,
            gutter: atlas.gutter,
            width: atlas.width,
            height: atlas.height,
            adjacency_epsilon: 0.0,
            break_bowties: true,
            flags: atlas.flags,
            parallel: atlas.parallel,
            lscm: atlas.lscm,
            progress: atlas.progress,
        }
    }
}

impl AtlasParams {
    /// Set the chart budget.
    pub fn with_max_charts(mut self, max_charts: usize) -> Self {
        self.max_charts = max_charts;
        self
    }

    /// Set the stretch bound.
    pub fn with_max_stretch(mut self, max_stretch: f64) -> Self {
        self.max_stretch = max_stretch;
        self
    }

    /// Set the gutter in pixels.
    pub fn with_gutter(mut self, gutter: f64) -> Self {
        self.gutter = gutter;
        self
    }

    /// Set the canvas size in pixels.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the welding tolerance.
    pub fn with_adjacency_epsilon(mut self, epsilon: f32) -> Self {
        self.adjacency_epsilon = epsilon;
        self
    }

    /// Set whether bowtie vertices are split.
    pub fn with_break_bowties(mut self, break_bowties: bool) -> Self {
        self.break_bowties = break_bowties;
        self
    }

    /// Set the algorithm variant bits.
    pub fn with_flags(mut self, flags: AtlasFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create parameters for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the conformal solver settings.
    pub fn with_lscm(mut self, lscm: LSCMOptions) -> Self {
        self.lscm = lscm;
        self
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Check every parameter against its documented range.
    ///
    /// # Errors
    ///
    /// [`AtlasError::InvalidParameter`] naming the first offending parameter.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.adjacency_epsilon.is_finite() && self.adjacency_epsilon >= 0.0) {
            return Err(AtlasError::invalid_param(
                "adjacency_epsilon",
                self.adjacency_epsilon,
                "must be non-negative and finite",
            ));
        }
        self.atlas_options().validate()
    }

    /// Options for the adjacency stage.
    pub fn adjacency_options(&self) -> AdjacencyOptions {
        AdjacencyOptions::default()
            .with_epsilon(self.adjacency_epsilon)
            .with_parallel(self.parallel)
    }

    /// Options for the atlas stage. Its progress is reported inside the
    /// pipeline's last step.
    pub fn atlas_options(&self) -> AtlasOptions {
        AtlasOptions::default()
            .with_max_charts(self.max_charts)
            .with_max_stretch(self.max_stretch)
            .with_gutter(self.gutter)
            .with_size(self.width, self.height)
            .with_flags(self.flags)
            .with_parallel(self.parallel)
            .with_lscm(self.lscm.clone())
            .with_progress(self.progress.nested(STEPS - 1, STEPS))
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct AtlasResult {
    /// Cleaned positions: the input positions followed by bowtie duplicates.
    pub positions: Vec<[f32; 3]>,
    /// Source vertex of every duplicate appended by cleaning.
    pub duplicates: DuplicationRecord,
    /// Findings of the validation stage that did not stop the run.
    pub validation: ValidationReport,
    /// The atlas over the cleaned mesh.
    pub atlas: AtlasOutput,
}

impl AtlasResult {
    /// Number of cleaned vertices (input vertices plus duplicates).
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// UV of every vertex instance.
    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.atlas.uvs
    }

    /// Triangle list over vertex instances.
    pub fn indices(&self) -> &[u32] {
        &self.atlas.indices
    }

    /// Cleaned vertex of every vertex instance.
    pub fn vertex_remap(&self) -> &[u32] {
        &self.atlas.vertex_remap
    }
}

/// Clean a mesh given as caller arrays and build its atlas.
///
/// # Errors
///
/// The first failing stage's error, tagged with that stage. Invalid
/// parameters are reported by the [`Stage::Validate`] stage before the mesh
/// is built.
pub fn prepare_and_atlas(
    positions: &[[f32; 3]],
    indices: &[u32],
    params: &AtlasParams,
) -> PipelineResult<AtlasResult> {
    params.validate().map_err(at(Stage::Validate))?;
    let mesh = MeshBuffer::create(positions, indices).map_err(at(Stage::Mesh))?;
    prepare_mesh_and_atlas(mesh, params)
}

/// Run every stage after mesh construction on an existing mesh.
///
/// Use this with [`MeshBuffer::from_components`] for split coordinate arrays.
///
/// # Errors
///
/// Same as [`prepare_and_atlas`].
pub fn prepare_mesh_and_atlas(mut mesh: MeshBuffer, params: &AtlasParams) -> PipelineResult<AtlasResult> {
    let progress = &params.progress;
    params.validate().map_err(at(Stage::Validate))?;
    debug!(
        "pipeline: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );

    progress.report(0, STEPS, "Validating mesh");
    let validation = validate(&mesh, None, &ValidateOptions::geometry_only()).map_err(at(Stage::Validate))?;
    if let Some(v) = validation.non_finite_vertices.first() {
        return Err(PipelineError::new(
            Stage::Validate,
            AtlasError::NonFinitePosition { vertex: v.index() },
        ));
    }
    if validation.degenerate_faces.len() == mesh.face_count() {
        return Err(PipelineError::new(
            Stage::Validate,
            AtlasError::DegenerateMesh(format!("all {} faces are degenerate", mesh.face_count())),
        ));
    }
    if !validation.is_clean() {
        warn!(
            "validation: {} degenerate faces, {} unused vertices",
            validation.degenerate_faces.len(),
            validation.unused_vertices.len()
        );
        for message in &validation.messages {
            debug!("validation: {}", message);
        }
    }

    progress.report(1, STEPS, "Building adjacency");
    let mut adjacency = build_adjacency(&mesh, &params.adjacency_options()).map_err(at(Stage::Adjacency))?;

    progress.report(2, STEPS, "Cleaning topology");
    let duplicates = clean(&mut mesh, &adjacency, params.break_bowties).map_err(at(Stage::Clean))?;

    progress.report(3, STEPS, "Rebuilding adjacency");
    if adjacency.is_stale(&mesh) {
        debug!("rebuilding adjacency after {} duplicates", duplicates.len());
        adjacency = build_adjacency(&mesh, &params.adjacency_options()).map_err(at(Stage::Adjacency))?;
    }

    progress.report(4, STEPS, "Generating atlas");
    let atlas = atlas(&mesh, &adjacency, &params.atlas_options()).map_err(at(Stage::Atlas))?;

    let positions = mesh.position_array();
    info!(
        "pipeline: {} vertices ({} duplicated), {} charts, {} vertex instances",
        positions.len(),
        duplicates.len(),
        atlas.chart_count,
        atlas.uvs.len()
    );
    progress.report(STEPS, STEPS, "Done");

    Ok(AtlasResult {
        positions,
        duplicates,
        validation,
        atlas,
    })
}

fn at(stage: Stage) -> impl Fn(AtlasError) -> PipelineError {
    move |source| PipelineError::new(stage, source)
}
