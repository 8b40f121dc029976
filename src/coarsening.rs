//! Non-smoothed aggregation coarsening.
//!
//! A coarsener takes the system matrix of a level and returns the transfer
//! operators `P` and `R` together with the matrix of the next level. Here
//! `P` is the piecewise constant interpolation over aggregates and the
//! coarse matrix is the Galerkin operator rescaled by `1 / over_interp`.
//! Using `α > 1` is the same as multiplying every coarse correction by `α`,
//! smooth error is underestimated by piecewise constant interpolation and
//! the overshoot makes up for it.

use crate::aggregates::Aggregates;
use crate::interpolation::{prolongation, restriction};
use crate::params::AggregationParams;
use crate::{CsrMatrix, Vector};

/// Aggregate `mat` and build `P` and `R = Pᵗ`.
pub fn transfer_operators(
    mat: &CsrMatrix,
    params: &AggregationParams,
) -> (Aggregates, CsrMatrix, CsrMatrix) {
    let aggregates = Aggregates::new(mat, params);
    let p = prolongation(&aggregates);
    let r = restriction(&p);
    (aggregates, p, r)
}

/// Coarse matrix `(1 / over_interp) * R * A * P`, computed with sparse
/// products only.
pub fn galerkin(mat: &CsrMatrix, p: &CsrMatrix, r: &CsrMatrix, over_interp: f64) -> CsrMatrix {
    let ap = mat * p;
    let mut coarse = r * &ap;
    let scale = 1.0 / over_interp;
    coarse.map_inplace(|v| v * scale);
    coarse
}

/// Main diagonal of `mat` with zeros for entries that are not stored.
pub fn diagonal(mat: &CsrMatrix) -> Vector {
    mat.outer_iterator()
        .enumerate()
        .map(|(i, row)| row.get(i).copied().unwrap_or(0.0))
        .collect()
}

/// Relative [`asymmetry`] accepted for a symmetric matrix. Galerkin
/// products of a symmetric matrix are symmetric up to summation order.
pub const SYMMETRY_TOL: f64 = 1e-10;

/// Largest `|a_ij - a_ji| / max(|a_ij|, |a_ji|)` over the stored entries,
/// an entry without a stored transpose counts as `1`.
pub fn asymmetry(mat: &CsrMatrix) -> f64 {
    let mut max: f64 = 0.0;
    for (i, row) in mat.outer_iterator().enumerate() {
        for (j, val) in row.iter() {
            let transposed = mat.get(j, i).copied().unwrap_or(0.0);
            let size = val.abs().max(transposed.abs());
            if size > 0.0 {
                max = max.max((val - transposed).abs() / size);
            }
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{poisson_1d, poisson_2d};
    use approx::assert_abs_diff_eq;
    use sprs::is_symmetric;
    use test_generator::test_resources;

    #[test_resources("test_matrices/*.mtx")]
    fn galerkin_preserves_symmetry(mat_path: &str) {
        let mat = sprs::io::read_matrix_market::<f64, usize, _>(mat_path)
            .unwrap()
            .to_csr::<usize>();
        assert!(is_symmetric(&mat));
        let (aggregates, p, r) = transfer_operators(&mat, &AggregationParams::default());

        for alpha in [1.0, 1.5, 2.0, 3.7] {
            let coarse = galerkin(&mat, &p, &r, alpha);
            assert_eq!(coarse.rows(), aggregates.count);
            assert_eq!(coarse.cols(), aggregates.count);
            assert!(asymmetry(&coarse) < 1e-12);
        }
    }

    #[test]
    fn coarse_operator_sums_aggregate_blocks() {
        // aggregates {0,1,2}, {3,4,5}: each block of [-1 2 -1] sums to 2
        let mat = poisson_1d(6);
        let (aggregates, p, r) = transfer_operators(&mat, &AggregationParams::default());
        assert_eq!(aggregates.count, 2);

        let coarse = galerkin(&mat, &p, &r, 1.0);
        assert_abs_diff_eq!(*coarse.get(0, 0).unwrap(), 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(*coarse.get(0, 1).unwrap(), -1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(*coarse.get(1, 0).unwrap(), -1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(*coarse.get(1, 1).unwrap(), 2.0, epsilon = 1e-14);

        let scaled = galerkin(&mat, &p, &r, 1.5);
        for (a, b) in coarse.data().iter().zip(scaled.data().iter()) {
            assert_abs_diff_eq!(a / 1.5, *b, epsilon = 1e-14);
        }
    }

    #[test]
    fn coarse_matrix_stays_sparse() {
        let mat = poisson_2d(20, 1.0, 1.0);
        let (aggregates, p, r) = transfer_operators(&mat, &AggregationParams::default());
        let coarse = galerkin(&mat, &p, &r, 1.5);
        assert!(coarse.is_csr());
        assert!(coarse.nnz() < aggregates.count * aggregates.count / 4);
    }

    #[test]
    fn asymmetry_is_relative() {
        let mut mat = poisson_1d(5);
        assert_eq!(asymmetry(&mat), 0.0);
        if let Some(v) = mat.get_mut(1, 2) {
            *v = -0.5;
        }
        assert_abs_diff_eq!(asymmetry(&mat), 0.5, epsilon = 1e-14);
    }

    #[test]
    fn diagonal_of_poisson() {
        let mat = poisson_2d(4, 1.0, 2.0);
        let diag = diagonal(&mat);
        assert_eq!(diag.len(), 16);
        assert!(diag.iter().all(|d| *d == 6.0));
    }
}
