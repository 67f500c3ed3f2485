//! Texture atlas generation.
//!
//! [`atlas`] partitions a cleaned mesh into charts, flattens each chart, packs
//! the charts into a pixel canvas and emits one UV per vertex instance.
//!
//! # Stages
//!
//! 1. **Growth.** Charts grow breadth-first over face adjacency while every
//!    face normal stays within `max_stretch` of the seed normal (measured as
//!    `1 - cos θ`, the stretch a projection onto the seed plane introduces).
//! 2. **Flattening.** Each chart is projected onto its seed plane and then
//!    relaxed with LSCM unless [`AtlasFlags::FAST`] is set. Charts are scaled
//!    to a common texel density.
//! 3. **Packing.** Charts are oriented, then shelf-packed largest first at the
//!    largest uniform scale that fits, `gutter` pixels apart.
//! 4. **Emission.** A vertex shared by several charts gets one instance per
//!    chart, and `vertex_remap` points each instance back at its vertex.
//!
//! # Example
//!
//! ```
//! use tessera::algo::atlas::{atlas, AtlasOptions};
//! use tessera::mesh::{AdjacencyTable, MeshBuffer};
//!
//! let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]];
//! let mesh = MeshBuffer::create(&positions, &[0, 1, 2, 0, 2, 3]).unwrap();
//! let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
//!
//! let output = atlas(&mesh, &adjacency, &AtlasOptions::default().with_size(256, 256)).unwrap();
//! assert_eq!(output.chart_count, 1);
//! assert!(output.uvs.iter().flatten().all(|&c| (0.0..=1.0).contains(&c)));
//! ```

mod charts;
mod emit;
mod flatten;
mod pack;

use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;
use nalgebra::Point2;
use rayon::prelude::*;

use crate::algo::parameterize::LSCMOptions;
use crate::error::{AtlasError, Result};
use crate::mesh::{AdjacencyTable, ChartId, FaceId, MeshBuffer};

use super::Progress;

use charts::{face_geometry, grow_charts, Chart};
use emit::emit_instances;
use flatten::{flatten_chart, FlatChart};
use pack::{orient, pack};

/// Algorithm variant bits.
///
/// Unknown bits are kept but ignored, so callers can pass a raw mask through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AtlasFlags(u32);

impl AtlasFlags {
    /// Conformal flattening with rotation during packing.
    pub const DEFAULT: Self = Self(0);
    /// Skip the conformal solve; charts keep their planar projection.
    pub const FAST: Self = Self(0x1);
    /// Pack charts in the orientation flattening produced.
    pub const NO_ROTATION: Self = Self(0x2);

    /// Flags from a raw mask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw mask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AtlasFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AtlasFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Options for atlas generation.
#[derive(Debug, Clone)]
pub struct AtlasOptions {
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

    /// Algorithm variant bits.
    pub flags: AtlasFlags,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Conformal solver settings.
    pub lscm: LSCMOptions,

    /// Progress reporter.
    pub progress: Progress,
}

impl Default for AtlasOptions {
    fn default() -> Self {
        Self {
            max_charts: 256,
            max_stretch: 1.0 / 6.0,
            gutter: 2.0,
            width: 512,
            height: 512,
            flags: AtlasFlags::DEFAULT,
            parallel: true,
            lscm: LSCMOptions::default(),
            progress: Progress::none(),
        }
    }
}

impl AtlasOptions {
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

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// [`AtlasError::InvalidParameter`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_charts == 0 {
            return Err(AtlasError::invalid_param("max_charts", 0, "must be at least 1"));
        }
        if !(self.max_stretch.is_finite() && self.max_stretch > 0.0) {
            return Err(AtlasError::invalid_param(
                "max_stretch",
                self.max_stretch,
                "must be positive and finite",
            ));
        }
        if !(self.gutter.is_finite() && self.gutter >= 0.0) {
            return Err(AtlasError::invalid_param(
                "gutter",
                self.gutter,
                "must be non-negative and finite",
            ));
        }
        if self.width == 0 {
            return Err(AtlasError::invalid_param("width", 0, "must be positive"));
        }
        if self.height == 0 {
            return Err(AtlasError::invalid_param("height", 0, "must be positive"));
        }
        Ok(())
    }
}

/// Result of [`atlas`].
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasOutput {
    /// UV of every vertex instance, each component in `[0, 1]`.
    pub uvs: Vec<[f32; 2]>,
    /// Triangle list over vertex instances (three per face, same face order).
    pub indices: Vec<u32>,
    /// Mesh vertex of every vertex instance.
    pub vertex_remap: Vec<u32>,
    /// Chart of every vertex instance (invalid for unreferenced vertices).
    pub instance_charts: Vec<ChartId>,
    /// Chart of every face.
    pub face_charts: Vec<ChartId>,
    /// Number of charts.
    pub chart_count: usize,
    /// Worst per-face stretch over all charts, `1 - σ_min / σ_max`.
    pub stretch: f64,
}

impl AtlasOutput {
    /// Number of vertex instances.
    #[inline]
    pub fn instance_count(&self) -> usize {
        self.uvs.len()
    }

    /// Number of faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.face_charts.len()
    }

    /// Vertex instances of a face.
    #[inline]
    pub fn triangle(&self, f: FaceId) -> [u32; 3] {
        let i = f.index() * 3;
        [self.indices[i], self.indices[i + 1], self.indices[i + 2]]
    }

    /// Chart of a face.
    #[inline]
    pub fn chart_of(&self, f: FaceId) -> ChartId {
        self.face_charts[f.index()]
    }
}

/// Build a texture atlas for `mesh`.
///
/// `adjacency` must have been built from `mesh` as it is now; run
/// [`clean`](crate::mesh::clean) first so bowties do not tie charts together
/// through a single vertex.
///
/// # Errors
///
/// - [`AtlasError::InvalidParameter`] for out-of-range options
/// - [`AtlasError::InvalidState`] for stale adjacency
/// - [`AtlasError::ChartBudgetExceeded`] when more than `max_charts` charts are needed
/// - [`AtlasError::PackingFailed`] when the charts do not fit the canvas
/// - [`AtlasError::OutOfMemory`] when the output buffers cannot be allocated
pub fn atlas(mesh: &MeshBuffer, adjacency: &AdjacencyTable, options: &AtlasOptions) -> Result<AtlasOutput> {
    options.validate()?;
    if mesh.face_count() == 0 {
        return Err(AtlasError::DegenerateMesh("no faces to chart".into()));
    }
    adjacency.ensure_current(mesh)?;

    let progress = &options.progress;
    const STEPS: usize = 4;

    progress.report(0, STEPS, "Growing charts");
    let geometry = face_geometry(mesh, adjacency, options.parallel);
    let grown = grow_charts(adjacency, &geometry, options.max_stretch, options.max_charts)?;

    let chart_count = grown.charts.len();
    let done = AtomicUsize::new(0);
    let flatten = |(index, chart): (usize, &Chart)| {
        let flat = flatten_chart(mesh, chart, index, options);
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        progress.report_sub(finished, chart_count, 1, STEPS, "Flattening charts");
        flat
    };
    let mut flat: Vec<FlatChart> = if options.parallel {
        grown.charts.par_iter().enumerate().map(flatten).collect()
    } else {
        grown.charts.iter().enumerate().map(flatten).collect()
    };

    progress.report(2, STEPS, "Packing charts");
    let rotate = !options.flags.contains(AtlasFlags::NO_ROTATION);
    let sizes: Vec<(f64, f64)> = flat.iter_mut().map(|c| orient(&mut c.uv, rotate)).collect();
    let areas: Vec<f64> = flat.iter().map(|c| c.area).collect();
    let packing = pack(&sizes, &areas, options.gutter, options.width, options.height)?;
    if !packing.is_disjoint(options.width, options.height) {
        return Err(AtlasError::InvalidState("packed chart cells overlap".into()));
    }

    let (canvas_w, canvas_h) = (options.width as f64, options.height as f64);
    for (index, chart) in flat.iter_mut().enumerate() {
        for v in 0..chart.uv.len() {
            let px = packing.to_pixels(index, chart.uv.get(v), options.gutter);
            chart.uv.set(v, Point2::new(px.x / canvas_w, px.y / canvas_h));
        }
    }

    progress.report(3, STEPS, "Emitting vertex instances");
    let instances = emit_instances(mesh, &grown, &flat)?;
    check_unit_square(&instances.uvs)?;

    let stretch = flat.iter().map(|c| c.stretch).fold(0.0, f64::max);
    info!(
        "atlas: {} charts, {} vertex instances ({} added), max stretch {:.4}",
        chart_count,
        instances.uvs.len(),
        instances.uvs.len() - mesh.vertex_count(),
        stretch
    );
    progress.report(STEPS, STEPS, "Atlas complete");

    Ok(AtlasOutput {
        uvs: instances.uvs,
        indices: instances.indices,
        vertex_remap: instances.vertex_remap,
        instance_charts: instances.instance_charts,
        face_charts: grown.face_charts,
        chart_count,
        stretch,
    })
}

/// Fail with [`AtlasError::InvalidState`] naming the first UV outside `[0, 1]²`.
fn check_unit_square(uvs: &[[f32; 2]]) -> Result<()> {
    match uvs
        .iter()
        .position(|uv| !uv.iter().all(|c| (0.0..=1.0).contains(c)))
    {
        Some(instance) => Err(AtlasError::InvalidState(format!(
            "instance {} has UV {:?} outside the unit square",
            instance, uvs[instance]
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_and_adjacency(positions: &[[f32; 3]], indices: &[u32]) -> (MeshBuffer, AdjacencyTable) {
        let mesh = MeshBuffer::create(positions, indices).unwrap();
        let adjacency = AdjacencyTable::build(&mesh, 0.0).unwrap();
        (mesh, adjacency)
    }

    /// Two unit squares meeting at a right angle along the y axis.
    fn folded_square() -> (MeshBuffer, AdjacencyTable) {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        mesh_and_adjacency(&positions, &[0, 1, 2, 0, 2, 3, 0, 3, 5, 0, 5, 4])
    }

    fn assert_consistent(mesh: &MeshBuffer, output: &AtlasOutput) {
        assert_eq!(output.indices.len(), mesh.face_count() * 3);
        assert_eq!(output.vertex_remap.len(), output.instance_count());
        assert_eq!(output.instance_charts.len(), output.instance_count());
        for f in mesh.face_ids() {
            let tri = output.triangle(f);
            for (corner, &instance) in tri.iter().enumerate() {
                assert_eq!(output.instance_charts[instance as usize], output.chart_of(f));
                assert_eq!(output.vertex_remap[instance as usize], mesh.triangle(f)[corner]);
            }
        }
        for i in 0..mesh.vertex_count() {
            assert_eq!(output.vertex_remap[i], i as u32);
        }
        assert!(output.uvs.iter().flatten().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn test_atlas_flags() {
        let flags = AtlasFlags::FAST | AtlasFlags::NO_ROTATION;
        assert!(flags.contains(AtlasFlags::FAST));
        assert!(flags.contains(AtlasFlags::DEFAULT));
        assert!(!AtlasFlags::FAST.contains(AtlasFlags::NO_ROTATION));
        assert_eq!(AtlasFlags::from_bits(0x80).bits(), 0x80);

        let mut flags = AtlasFlags::default();
        flags |= AtlasFlags::NO_ROTATION;
        assert_eq!(flags, AtlasFlags::NO_ROTATION);
    }

    #[test]
    fn test_options_validate() {
        assert!(AtlasOptions::default().validate().is_ok());

        let cases = [
            (AtlasOptions::default().with_max_charts(0), "max_charts"),
            (AtlasOptions::default().with_max_stretch(0.0), "max_stretch"),
            (AtlasOptions::default().with_max_stretch(f64::NAN), "max_stretch"),
            (AtlasOptions::default().with_gutter(-1.0), "gutter"),
            (AtlasOptions::default().with_size(0, 16), "width"),
            (AtlasOptions::default().with_size(16, 0), "height"),
        ];
        for (options, field) in cases {
            match options.validate() {
                Err(AtlasError::InvalidParameter { name, .. }) => assert_eq!(name, field),
                other => panic!("expected {} to be rejected, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn test_single_triangle_one_chart() {
        let (mesh, adjacency) =
            mesh_and_adjacency(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], &[0, 1, 2]);
        let options = AtlasOptions::default().with_max_charts(1).with_gutter(4.0).with_size(64, 64);

        let output = atlas(&mesh, &adjacency, &options).unwrap();
        assert_eq!(output.chart_count, 1);
        assert_eq!(output.instance_count(), 3);
        assert_consistent(&mesh, &output);

        // Half the gutter stays clear at the canvas border.
        let margin = 2.0 / 64.0 - 1e-6;
        for uv in &output.uvs {
            assert!(uv[0] >= margin && uv[0] <= 1.0 - margin);
            assert!(uv[1] >= margin && uv[1] <= 1.0 - margin);
        }
    }

    #[test]
    fn test_fold_duplicates_seam_vertices() {
        let (mesh, adjacency) = folded_square();
        let output = atlas(&mesh, &adjacency, &AtlasOptions::default()).unwrap();

        assert_eq!(output.chart_count, 2);
        // Vertices 0 and 3 lie on the seam.
        assert_eq!(output.instance_count(), 8);
        assert_eq!(&output.vertex_remap[6..], &[0, 3]);
        assert_consistent(&mesh, &output);
        assert!(output.stretch < 1e-6);
    }

    #[test]
    fn test_charts_keep_gutter_apart() {
        let (mesh, adjacency) = folded_square();
        let gutter = 8.0;
        let output = atlas(&mesh, &adjacency, &AtlasOptions::default().with_gutter(gutter).with_size(128, 128))
            .unwrap();

        let bbox = |chart: ChartId| {
            let mut lo = [f32::INFINITY; 2];
            let mut hi = [f32::NEG_INFINITY; 2];
            for (uv, _) in output
                .uvs
                .iter()
                .zip(&output.instance_charts)
                .filter(|&(_, &c)| c == chart)
            {
                for k in 0..2 {
                    lo[k] = lo[k].min(uv[k]);
                    hi[k] = hi[k].max(uv[k]);
                }
            }
            (lo, hi)
        };
        let (a_lo, a_hi) = bbox(ChartId::new(0));
        let (b_lo, b_hi) = bbox(ChartId::new(1));
        let gap_x = (b_lo[0] - a_hi[0]).max(a_lo[0] - b_hi[0]);
        let gap_y = (b_lo[1] - a_hi[1]).max(a_lo[1] - b_hi[1]);
        assert!(gap_x.max(gap_y) >= (gutter / 128.0) as f32 - 1e-5);
    }

    /// A latitude/longitude sphere with `rings` bands and `segments` slices.
    fn sphere(rings: usize, segments: usize) -> (MeshBuffer, AdjacencyTable) {
        use std::f64::consts::{PI, TAU};

        let mut positions = vec![[0.0, 0.0, 1.0]];
        for r in 1..rings {
            let theta = PI * r as f64 / rings as f64;
            for k in 0..segments {
                let phi = TAU * k as f64 / segments as f64;
                positions.push([
                    (theta.sin() * phi.cos()) as f32,
                    (theta.sin() * phi.sin()) as f32,
                    theta.cos() as f32,
                ]);
            }
        }
        positions.push([0.0, 0.0, -1.0]);

        let south = (positions.len() - 1) as u32;
        let ring = |r: usize, k: usize| (1 + (r - 1) * segments + k % segments) as u32;
        let mut indices = Vec::new();
        for k in 0..segments {
            indices.extend_from_slice(&[0, ring(1, k), ring(1, k + 1)]);
            for r in 1..rings - 1 {
                let (a, b) = (ring(r, k), ring(r, k + 1));
                let (c, d) = (ring(r + 1, k + 1), ring(r + 1, k));
                indices.extend_from_slice(&[a, d, c, a, c, b]);
            }
            indices.extend_from_slice(&[south, ring(rings - 1, k + 1), ring(rings - 1, k)]);
        }
        mesh_and_adjacency(&positions, &indices)
    }

    #[test]
    fn test_many_charts_keep_gutter_apart() {
        let (mesh, adjacency) = sphere(12, 24);
        let (gutter, width, height) = (3.0, 512, 192);
        let options = AtlasOptions::default().with_gutter(gutter).with_size(width, height);

        let output = atlas(&mesh, &adjacency, &options).unwrap();
        assert!(output.chart_count >= 8, "only {} charts", output.chart_count);
        assert_consistent(&mesh, &output);

        let min_gap = (gutter / width.max(height) as f64) as f32 - 1e-5;
        let points: Vec<_> = output.uvs.iter().zip(&output.instance_charts).collect();
        for (i, &(a, chart_a)) in points.iter().enumerate() {
            for &(b, chart_b) in &points[i + 1..] {
                if chart_a == chart_b || !chart_a.is_valid() || !chart_b.is_valid() {
                    continue;
                }
                let d = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
                assert!(d >= min_gap, "charts {:?} and {:?} are {} apart", chart_a, chart_b, d);
            }
        }
    }

    #[test]
    fn test_unit_square_check() {
        assert!(check_unit_square(&[[0.0, 0.0], [1.0, 1.0], [0.5, 0.25]]).is_ok());
        for bad in [[1.0 + 1e-6, 0.5], [0.5, -1e-6], [f32::NAN, 0.5]] {
            let err = check_unit_square(&[[0.5, 0.5], bad]).unwrap_err();
            assert!(matches!(err, AtlasError::InvalidState(ref m) if m.starts_with("instance 1 ")));
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (mesh, adjacency) = folded_square();
        let a = atlas(&mesh, &adjacency, &AtlasOptions::default().with_parallel(true)).unwrap();
        let b = atlas(&mesh, &adjacency, &AtlasOptions::default().with_parallel(false)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_budget_and_packing_failures() {
        let (mesh, adjacency) = folded_square();

        let err = atlas(&mesh, &adjacency, &AtlasOptions::default().with_max_charts(1)).unwrap_err();
        assert_eq!(err, AtlasError::ChartBudgetExceeded { max_charts: 1 });
        assert!(err.is_recoverable());

        let err = atlas(&mesh, &adjacency, &AtlasOptions::default().with_gutter(6.0).with_size(8, 8))
            .unwrap_err();
        assert!(matches!(err, AtlasError::PackingFailed { charts: 2, .. }));
    }

    #[test]
    fn test_stale_adjacency_rejected() {
        let (mut mesh, adjacency) = folded_square();
        mesh.duplicate_vertex(crate::mesh::VertexId::new(0));
        assert!(matches!(
            atlas(&mesh, &adjacency, &AtlasOptions::default()),
            Err(AtlasError::InvalidState(_))
        ));
    }

    #[test]
    fn test_progress_reaches_end() {
        use std::sync::{Arc, Mutex};

        let last = Arc::new(Mutex::new((0, 0)));
        let sink = Arc::clone(&last);
        let progress = Progress::new(move |current, total, _| {
            *sink.lock().unwrap() = (current, total);
        });

        let (mesh, adjacency) = folded_square();
        atlas(&mesh, &adjacency, &AtlasOptions::default().with_progress(progress)).unwrap();
        assert_eq!(*last.lock().unwrap(), (4, 4));
    }
}
