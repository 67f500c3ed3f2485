//! Row-compressed sparse matrices and a Jacobi-preconditioned CG solver.
//!
//! Only what the conformal solve needs: assembly from triplets, products
//! with dense vectors and the diagonal for the preconditioner.

use nalgebra::DVector;

use crate::error::{AtlasError, Result};

/// Sparse matrix stored row by row, entries sorted by column.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the slice of row `i` in `col_idx`/`values`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Assemble from `(row, col, value)` entries in any order.
    ///
    /// Repeated positions accumulate, which is how per-triangle
    /// contributions are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            if last == Some((row, col)) {
                if let Some(acc) = values.last_mut() {
                    *acc += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                last = Some((row, col));
            }
        }
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Row count.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Column count.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Stored entries after merging duplicates.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// The diagonal (zero where no entry is stored).
    pub fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.rows, |i, _| {
            (self.row_ptr[i]..self.row_ptr[i + 1])
                .find(|&k| self.col_idx[k] == i)
                .map_or(0.0, |k| self.values[k])
        })
    }

    /// `A * x`. `x` must have [`ncols`](Self::ncols) entries.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.cols);

        DVector::from_fn(self.rows, |i, _| {
            (self.row_ptr[i]..self.row_ptr[i + 1])
                .map(|k| self.values[k] * x[self.col_idx[k]])
                .sum()
        })
    }
}

/// Solve `A x = b` for symmetric positive definite `A`.
///
/// Starts from `x0` (zero when absent) and stops once the residual norm
/// relative to `|b|` drops below `tolerance`. Returns the solution and the
/// number of iterations taken.
///
/// # Errors
///
/// - [`AtlasError::InvalidState`] if the dimensions of `a`, `b` and `x0` disagree
/// - [`AtlasError::DegenerateMesh`] if a diagonal entry is not positive
/// - [`AtlasError::ConvergenceFailed`] if the tolerance is not reached
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    max_iter: usize,
    tolerance: f64,
) -> Result<(DVector<f64>, usize)> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n || x0.is_some_and(|x| x.len() != n) {
        return Err(AtlasError::InvalidState(format!(
            "{}x{} system with a right-hand side of length {}",
            a.nrows(),
            a.ncols(),
            n
        )));
    }

    let diag = a.diagonal();
    if diag.iter().any(|&d| !(d > 0.0)) {
        return Err(AtlasError::DegenerateMesh(
            "system has a free unknown with no stiffness".into(),
        ));
    }
    let inv_diag = diag.map(|d| 1.0 / d);

    let mut x = x0.cloned().unwrap_or_else(|| DVector::zeros(n));
    let mut r = b - a.mul_vec(&x);

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return Ok((x, 0));
    }
    if r.norm() / b_norm < tolerance {
        return Ok((x, 0));
    }

    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 1..=max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            break;
        }
        let alpha = rz / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        if r.norm() / b_norm < tolerance {
            return Ok((x, iter));
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + beta * &p;
        rz = rz_new;
    }

    Err(AtlasError::ConvergenceFailed {
        iterations: max_iter,
    })
}
