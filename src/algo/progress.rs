//! Progress reporting for long-running stages.
//!
//! Stages call [`Progress::report`] with `(current, total, message)` as they
//! advance. A stage that runs inside one step of a larger run gets a
//! [`Progress::nested`] reporter, so its own step counts land inside the
//! slot the caller gave it.
//!
//! # Example
//!
//! ```
//! use tessera::algo::progress::Progress;
//! use tessera::pipeline::AtlasParams;
//!
//! let progress = Progress::new(|current, total, stage| {
//!     eprintln!("{:>5.1}% {}", 100.0 * current as f64 / total as f64, stage);
//! });
//!
//! let params = AtlasParams::default().with_progress(progress);
//! ```

use std::sync::Arc;

type Callback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Resolution of a nested step.
const SUB_STEPS: usize = 1000;

/// Shared handle to a progress callback.
///
/// Clones report to the same callback, which may be invoked from rayon
/// workers, hence the `Send + Sync` bound.
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<Callback>,
}

impl Progress {
    /// Report through `callback`.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// A reporter that drops every update.
    pub fn none() -> Self {
        Self { callback: None }
    }

    /// Whether updates go anywhere.
    pub fn is_silent(&self) -> bool {
        self.callback.is_none()
    }

    /// Step `current` of `total` has started.
    #[inline]
    pub fn report(&self, current: usize, total: usize, message: &str) {
        if let Some(callback) = &self.callback {
            callback(current, total, message);
        }
    }

    /// Report `sub_current` of `sub_total` within step `step` of `steps`.
    ///
    /// The callback sees the combined position in units of 1/1000 step.
    /// Nothing is reported when either total is zero.
    #[inline]
    pub fn report_sub(&self, sub_current: usize, sub_total: usize, step: usize, steps: usize, message: &str) {
        if sub_total == 0 || steps == 0 {
            return;
        }
        let within = sub_current.min(sub_total) * SUB_STEPS / sub_total;
        self.report(step * SUB_STEPS + within, steps * SUB_STEPS, message);
    }

    /// A reporter whose whole range maps onto step `step` of `steps` here.
    pub fn nested(&self, step: usize, steps: usize) -> Progress {
        match &self.callback {
            None => Progress::none(),
            Some(_) => {
                let outer = self.clone();
                Progress::new(move |current, total, message| {
                    outer.report_sub(current, total, step, steps, message)
                })
            }
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("silent", &self.is_silent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Progress, Arc<Mutex<Vec<(usize, usize)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress = Progress::new(move |current, total, _| {
            sink.lock().unwrap().push((current, total));
        });
        (progress, seen)
    }

    #[test]
    fn test_clones_share_callback() {
        let (progress, seen) = recorder();

        progress.report(0, 2, "first");
        progress.clone().report(1, 2, "second");

        assert_eq!(*seen.lock().unwrap(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_report_sub_scales_into_step() {
        let (progress, seen) = recorder();

        progress.report_sub(1, 4, 2, 5, "charts");
        progress.report_sub(9, 4, 2, 5, "clamped");
        progress.report_sub(3, 0, 2, 5, "ignored");

        assert_eq!(*seen.lock().unwrap(), vec![(2250, 5000), (3000, 5000)]);
    }

    #[test]
    fn test_nested_maps_whole_range() {
        let (progress, seen) = recorder();
        let inner = progress.nested(4, 5);

        inner.report(0, 4, "start");
        inner.report(4, 4, "end");

        assert_eq!(*seen.lock().unwrap(), vec![(4000, 5000), (5000, 5000)]);
    }

    #[test]
    fn test_none_is_silent() {
        let progress = Progress::none();
        assert!(progress.is_silent());
        assert!(progress.nested(0, 1).is_silent());
        progress.report(0, 1, "dropped");
    }
}
