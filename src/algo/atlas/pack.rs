//! Chart packing.
//!
//! Charts are first turned to a compact orientation and moved to the origin.
//! A shelf packer then places them largest first, left to right in rows, each
//! in a cell padded by half the gutter on every side. The one free variable is
//! the global scale from chart units to pixels; it is found by bisection, so
//! packing always terminates after a fixed number of attempts.

use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_2;

use log::debug;
use nalgebra::{Point2, Rotation2, Vector2};

use crate::algo::parameterize::UVMap;
use crate::error::{AtlasError, Result};

/// Candidate angles tried when minimizing a chart's bounding box.
const ROTATION_STEPS: usize = 12;

/// Bisection steps for the global scale.
const SCALE_STEPS: usize = 40;

/// A rectangle of the canvas reserved for one chart, in pixels.
///
/// The chart itself sits `gutter / 2` inside the cell on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cell {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Placement of every chart at one global scale.
#[derive(Debug, Clone)]
pub(crate) struct Packing {
    /// Pixels per chart unit.
    pub scale: f64,
    /// Cell of every chart, indexed by chart.
    pub cells: Vec<Cell>,
    /// Chart indices in placement order.
    pub order: Vec<usize>,
}

/// Rotate a chart to a small bounding box, lay it landscape and move its
/// bounding box to the origin. Returns the box size.
pub(crate) fn orient(uv: &mut UVMap, rotate: bool) -> (f64, f64) {
    if rotate {
        let mut best = (0.0, f64::INFINITY);
        for step in 0..ROTATION_STEPS {
            let angle = FRAC_PI_2 * step as f64 / ROTATION_STEPS as f64;
            let (w, h) = rotated_extent(uv, angle);
            if w * h < best.1 {
                best = (angle, w * h);
            }
        }
        uv.rotate_scale(best.0, 1.0);
        let (w, h) = rotated_extent(uv, 0.0);
        if h > w {
            uv.rotate_scale(FRAC_PI_2, 1.0);
        }
    }

    match uv.bounding_box() {
        Some((min, max)) => {
            uv.translate(-min.coords);
            (max.x - min.x, max.y - min.y)
        }
        None => (0.0, 0.0),
    }
}

fn rotated_extent(uv: &UVMap, angle: f64) -> (f64, f64) {
    let rot = Rotation2::new(angle);
    let mut min = Vector2::repeat(f64::INFINITY);
    let mut max = Vector2::repeat(f64::NEG_INFINITY);
    for p in uv.as_slice() {
        let q = rot * p.coords;
        min = min.inf(&q);
        max = max.sup(&q);
    }
    if uv.is_empty() {
        return (0.0, 0.0);
    }
    (max.x - min.x, max.y - min.y)
}

/// Pack charts of the given sizes (in chart units) into a `width` x `height`
/// pixel canvas at the largest scale the bisection finds.
///
/// # Errors
///
/// [`AtlasError::PackingFailed`] when not even a vanishing scale fits, which
/// happens when the gutters alone overflow the canvas.
pub(crate) fn pack(
    sizes: &[(f64, f64)],
    areas: &[f64],
    gutter: f64,
    width: u32,
    height: u32,
) -> Result<Packing> {
    let failed = || AtlasError::PackingFailed {
        charts: sizes.len(),
        width,
        height,
    };
    let (canvas_w, canvas_h) = (width as f64, height as f64);

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        areas[b]
            .partial_cmp(&areas[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    // No chart may be larger than the canvas, and the boxes cannot cover
    // more than its area.
    let mut upper = f64::INFINITY;
    let mut box_area = 0.0;
    for &(w, h) in sizes {
        if w > 0.0 {
            upper = upper.min((canvas_w - gutter) / w);
        }
        if h > 0.0 {
            upper = upper.min((canvas_h - gutter) / h);
        }
        box_area += w * h;
    }
    if box_area > 0.0 {
        upper = upper.min((canvas_w * canvas_h / box_area).sqrt());
    }
    if !upper.is_finite() {
        // Every chart is a point.
        upper = 1.0;
    }
    if !(upper > 0.0) {
        return Err(failed());
    }

    let place = |scale: f64| shelf_pack(sizes, &order, scale, gutter, canvas_w, canvas_h);

    let (scale, cells) = match place(upper) {
        Some(cells) => (upper, cells),
        None => {
            let (mut lo, mut hi) = (0.0, upper);
            let mut best = None;
            for _ in 0..SCALE_STEPS {
                let mid = 0.5 * (lo + hi);
                match place(mid) {
                    Some(cells) => {
                        lo = mid;
                        best = Some(cells);
                    }
                    None => hi = mid,
                }
            }
            match best {
                Some(cells) => (lo, cells),
                None => {
                    debug!(
                        "packing {} charts with a {} px gutter does not fit {}x{}",
                        sizes.len(),
                        gutter,
                        width,
                        height
                    );
                    return Err(failed());
                }
            }
        }
    };

    let used: f64 = sizes.iter().map(|&(w, h)| w * h * scale * scale).sum();
    debug!(
        "packed {} charts at {:.4} px/unit, {:.1}% of the canvas covered",
        sizes.len(),
        scale,
        100.0 * used / (canvas_w * canvas_h)
    );

    Ok(Packing {
        scale,
        cells,
        order,
    })
}

/// Place every chart at one scale, or `None` if some chart does not fit.
fn shelf_pack(
    sizes: &[(f64, f64)],
    order: &[usize],
    scale: f64,
    gutter: f64,
    canvas_w: f64,
    canvas_h: f64,
) -> Option<Vec<Cell>> {
    let mut cells: Vec<Option<Cell>> = vec![None; sizes.len()];
    let (mut x, mut y, mut shelf) = (0.0, 0.0, 0.0f64);

    for &chart in order {
        let (w, h) = sizes[chart];
        let cell_w = w * scale + gutter;
        let cell_h = h * scale + gutter;
        if cell_w > canvas_w || cell_h > canvas_h {
            return None;
        }
        if x + cell_w > canvas_w {
            y += shelf;
            x = 0.0;
            shelf = 0.0;
        }
        if y + cell_h > canvas_h {
            return None;
        }
        cells[chart] = Some(Cell {
            x,
            y,
            width: cell_w,
            height: cell_h,
        });
        x += cell_w;
        shelf = shelf.max(cell_h);
    }

    cells.into_iter().collect()
}

impl Packing {
    /// Check that every cell lies inside the canvas and that no two cells
    /// overlap. Cells may share an edge.
    pub(crate) fn is_disjoint(&self, width: u32, height: u32) -> bool {
        let (canvas_w, canvas_h) = (width as f64, height as f64);
        let inside = |c: &Cell| {
            c.x >= 0.0 && c.y >= 0.0 && c.x + c.width <= canvas_w && c.y + c.height <= canvas_h
        };
        if !self.cells.iter().all(inside) {
            return false;
        }

        // Sweep along x: only cells starting before the current one ends can
        // overlap it.
        let mut by_x: Vec<&Cell> = self.cells.iter().collect();
        by_x.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
        for (i, a) in by_x.iter().enumerate() {
            for b in by_x[i + 1..].iter().take_while(|b| b.x < a.x + a.width) {
                if b.y < a.y + a.height && a.y < b.y + b.height {
                    return false;
                }
            }
        }
        true
    }

    /// Chart-unit coordinates to canvas pixels for one chart.
    pub(crate) fn to_pixels(&self, chart: usize, p: Point2<f64>, gutter: f64) -> Point2<f64> {
        let cell = &self.cells[chart];
        Point2::new(
            cell.x + 0.5 * gutter + p.x * self.scale,
            cell.y + 0.5 * gutter + p.y * self.scale,
        )
    }
}
