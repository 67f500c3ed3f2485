//! Charting algorithms.
//!
//! This module contains the algorithms that turn a cleaned mesh into a
//! texture atlas:
//!
//! - **Parameterization**: planar projection, LSCM, the sparse solver behind it
//! - **Atlas**: chart growth, packing and vertex instance emission
//! - **Progress**: callbacks for long-running stages

pub mod atlas;
pub mod parameterize;
pub mod progress;

pub use progress::Progress;
