//! Piecewise constant transfer operators built from an aggregation.

use crate::aggregates::Aggregates;
use crate::CsrMatrix;

/// Prolongation `P` with `P[i, id[i]] = 1` for every aggregated row and an
/// empty row for every unaggregated one.
pub fn prolongation(aggregates: &Aggregates) -> CsrMatrix {
    let n_fine = aggregates.len();
    let n_coarse = aggregates.count;

    let mut indptr = Vec::with_capacity(n_fine + 1);
    let mut indices = Vec::with_capacity(n_fine);
    indptr.push(0);
    for id in aggregates.id.iter() {
        if let Some(coarse_idx) = id {
            indices.push(*coarse_idx);
        }
        indptr.push(indices.len());
    }
    let data = vec![1.0; indices.len()];

    CsrMatrix::new((n_fine, n_coarse), indptr, indices, data)
}

/// Restriction `R = Pᵗ`.
pub fn restriction(p: &CsrMatrix) -> CsrMatrix {
    p.transpose_view().to_csr()
}
