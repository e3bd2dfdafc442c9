//! Symmetric eigendecomposition by cyclic Jacobi rotations
//!
//! Covariance matrices handled by the preprocessor are small (one row per
//! feature) and symmetric, which is the case Jacobi handles robustly.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// Eigendecomposition of a symmetric matrix: `A = V · diag(λ) · Vᵀ`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen {
    /// Eigenvalues, sorted descending.
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns, in eigenvalue order.
    pub eigenvectors: Array2<f64>,
}

impl SymmetricEigen {
    /// Decomposes `matrix`, which must be square and symmetric.
    ///
    /// Each sweep zeroes the largest off-diagonal entry until all of them fall
    /// under a tolerance relative to the matrix norm.
    pub fn new(matrix: &Array2<f64>) -> Result<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(Error::mismatch("eigen matrix columns", n, matrix.ncols()));
        }

        let mut d = matrix.clone();
        let mut v = Array2::<f64>::eye(n);

        let scale = matrix.iter().map(|x| x * x).sum::<f64>().sqrt().max(1.0);
        let tol = f64::EPSILON * 10.0 * scale;
        let max_iter = 100 * n * n;

        for _ in 0..max_iter {
            let mut max_val = 0.0;
            let mut p = 0;
            let mut q = 1;
            for i in 0..n {
                for j in (i + 1)..n {
                    let val = d[[i, j]].abs();
                    if val > max_val {
                        max_val = val;
                        p = i;
                        q = j;
                    }
                }
            }

            if max_val < tol {
                break;
            }

            let app = d[[p, p]];
            let aqq = d[[q, q]];
            let apq = d[[p, q]];

            let theta = (aqq - app) / (2.0 * apq);
            let t = if theta >= 0.0 {
                1.0 / (theta + (1.0 + theta * theta).sqrt())
            } else {
                -1.0 / (-theta + (1.0 + theta * theta).sqrt())
            };
            let c = 1.0 / (1.0 + t * t).sqrt();
            let s = t * c;

            d[[p, p]] = app - t * apq;
            d[[q, q]] = aqq + t * apq;
            d[[p, q]] = 0.0;
            d[[q, p]] = 0.0;

            for i in 0..n {
                if i == p || i == q {
                    continue;
                }
                let dip = d[[i, p]];
                let diq = d[[i, q]];
                d[[i, p]] = c * dip - s * diq;
                d[[p, i]] = d[[i, p]];
                d[[i, q]] = s * dip + c * diq;
                d[[q, i]] = d[[i, q]];
            }

            for i in 0..n {
                let vip = v[[i, p]];
                let viq = v[[i, q]];
                v[[i, p]] = c * vip - s * viq;
                v[[i, q]] = s * vip + c * viq;
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| d[[b, b]].total_cmp(&d[[a, a]]));

        let eigenvalues = Array1::from_shape_fn(n, |i| d[[order[i], order[i]]]);
        let eigenvectors = Array2::from_shape_fn((n, n), |(i, j)| v[[i, order[j]]]);

        Ok(Self {
            eigenvalues,
            eigenvectors,
        })
    }
}

/// Sample covariance (divided by `n`) of the columns of `data`.
pub fn covariance(data: &Array2<f64>) -> Array2<f64> {
    let n = data.nrows().max(1) as f64;
    let mean = data.sum_axis(ndarray::Axis(0)) / n;
    let centered = data - &mean;
    centered.t().dot(&centered) / n
}
