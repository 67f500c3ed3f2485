//! Chart parameterization.
//!
//! Flattens a single chart into the plane. Charts arrive as chart-local
//! positions and triangles; the result is a [`UVMap`] with one coordinate per
//! chart vertex, in arbitrary units and placement.
//!
//! - [`planar_projection`] projects along a normal. Fold-free whenever every
//!   triangle faces the same side of the plane.
//! - [`lscm`] / [`lscm_from`] solve for the least squares conformal map.
//!
//! LSCM needs a chart with boundary. Charts grown by the atlas always have
//! one: the normal bound keeps each chart's normals inside an open
//! hemisphere, which no closed surface fits into.
//!
//! ```
//! use tessera::algo::parameterize::{lscm, LSCMOptions};
//! use tessera::nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.2),
//!     Point3::new(0.0, 1.0, 0.2),
//! ];
//! let faces = [[0, 1, 2], [0, 2, 3]];
//! let uvs = lscm(&positions, &faces, &LSCMOptions::default()).unwrap();
//!
//! for (v, uv) in uvs.iter() {
//!     println!("{}: ({:.3}, {:.3})", v, uv.x, uv.y);
//! }
//! ```

mod lscm;
mod projection;
mod sparse;
mod uv;

pub use lscm::{lscm, lscm_from, LSCMOptions, PinStrategy, PinnedVertex};
pub use projection::{average_normal, planar_projection, tangent_frame};
pub use sparse::{conjugate_gradient, CsrMatrix};
pub use uv::UVMap;
