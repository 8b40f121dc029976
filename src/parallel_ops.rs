//! Parallel implementations of the sparse and dense kernels the cycles
//! spend almost all of their time in. These need to be fast.

use ndarray::Zip;

use crate::{CsrMatrix, Vector};

/// `y = alpha * A * x + beta * y`
pub fn spmv(alpha: f64, a: &CsrMatrix, x: &Vector, beta: f64, y: &mut Vector) {
    assert!(a.is_csr());
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());
    let indptr = a.indptr();
    let indptr = indptr.raw_storage();
    let indices = a.indices();
    let data = a.data();
    let offset = indptr[0];

    Zip::indexed(y).par_for_each(|i, yi| {
        let (start, end) = (indptr[i] - offset, indptr[i + 1] - offset);
        let ax: f64 = indices[start..end]
            .iter()
            .zip(data[start..end].iter())
            .map(|(j, val)| x[*j] * val)
            .sum();
        *yi = if beta == 0.0 {
            alpha * ax
        } else {
            alpha * ax + beta * *yi
        };
    });
}

/// `r = rhs - A * x`
pub fn residual(rhs: &Vector, a: &CsrMatrix, x: &Vector, r: &mut Vector) {
    r.assign(rhs);
    spmv(-1.0, a, x, 1.0, r);
}

pub fn inner_product(x: &Vector, y: &Vector) -> f64 {
    assert_eq!(x.len(), y.len());
    Zip::from(x).and(y).par_fold(|| 0.0, |acc, a, b| acc + a * b, |l, r| l + r)
}

/// `y = a * x + b * y`
pub fn axpby(a: f64, x: &Vector, b: f64, y: &mut Vector) {
    Zip::from(y).and(x).par_for_each(|yi, xi| *yi = a * xi + b * *yi);
}

/// `x = x ./ d`
pub fn element_div(x: &mut Vector, d: &Vector) {
    Zip::from(x).and(d).par_for_each(|xi, di| *xi /= di);
}
