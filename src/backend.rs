//! Storage and arithmetic used by the cycles.
//!
//! The hierarchy is always assembled on the host in [`CsrMatrix`] format.
//! Once a level is complete its matrices and vectors are handed to a
//! [`Backend`], which owns their storage and provides every operation the
//! cycles need. Two CPU backends are provided: [`CpuBackend`] runs the
//! kernels on the rayon thread pool, [`SerialBackend`] runs them on the
//! calling thread.

use ndarray::ArrayView1;
use sprs::SymmetryCheck;
use sprs_ldl::Ldl;

use crate::coarsening::{asymmetry, SYMMETRY_TOL};
use crate::error::{AmgError, Result};
use crate::parallel_ops;
use crate::{Cholesky, CsrMatrix, Vector};

/// Capabilities the cycle executor consumes.
///
/// Every operation is an associated function, a backend carries no state of
/// its own.
pub trait Backend {
    type Matrix;
    type Vector: Clone;
    type DirectSolver;

    fn name() -> &'static str;

    /// Take ownership of a host matrix.
    fn matrix(a: CsrMatrix) -> Self::Matrix;
    /// Copy a host vector into backend storage.
    fn vector(v: &Vector) -> Self::Vector;
    /// Copy a backend vector back to the host.
    fn to_host(v: &Self::Vector) -> Vector;
    fn zeros(n: usize) -> Self::Vector;
    fn len(v: &Self::Vector) -> usize;

    fn rows(a: &Self::Matrix) -> usize;
    fn cols(a: &Self::Matrix) -> usize;
    fn nonzeros(a: &Self::Matrix) -> usize;

    /// `y = alpha * A * x + beta * y`
    fn spmv(alpha: f64, a: &Self::Matrix, x: &Self::Vector, beta: f64, y: &mut Self::Vector);
    /// `r = rhs - A * x`
    fn residual(rhs: &Self::Vector, a: &Self::Matrix, x: &Self::Vector, r: &mut Self::Vector);
    /// `y = a * x + b * y`
    fn axpby(a: f64, x: &Self::Vector, b: f64, y: &mut Self::Vector);
    /// `x = x ./ d`
    fn element_div(x: &mut Self::Vector, d: &Self::Vector);
    fn inner_product(x: &Self::Vector, y: &Self::Vector) -> f64;
    fn scale(x: &mut Self::Vector, a: f64);
    fn clear(x: &mut Self::Vector);
    fn copy(src: &Self::Vector, dst: &mut Self::Vector);

    /// Factorize `a` for exact solves on the coarsest level.
    fn direct_solver(a: &CsrMatrix) -> Result<Self::DirectSolver>;
    /// `x = A⁻¹ * rhs`
    fn direct_solve(solver: &Self::DirectSolver, rhs: &Self::Vector, x: &mut Self::Vector);
}

/// Sparse LDLᵀ factorization of the coarsest matrix.
///
/// The factorization reads a single triangle and does not pivot, so the
/// matrix has to be symmetric and its leading minors nonsingular.
pub struct CoarseSolver {
    ldl: Cholesky,
    size: usize,
}

impl CoarseSolver {
    pub fn new(a: &CsrMatrix) -> Result<Self> {
        let size = a.rows();
        if size != a.cols() {
            return Err(AmgError::InvalidMatrix(format!(
                "coarse matrix is {}x{}",
                a.rows(),
                a.cols()
            )));
        }
        let skew = asymmetry(a);
        if skew > SYMMETRY_TOL {
            return Err(AmgError::InvalidMatrix(format!(
                "coarse matrix of size {size} is not symmetric (relative asymmetry {skew:.3e})"
            )));
        }
        trace!("factorizing coarse problem of size {size}");
        let ldl = Ldl::new()
            .check_symmetry(SymmetryCheck::DontCheckSymmetry)
            .numeric(a.view())
            .map_err(|err| AmgError::SingularCoarseOperator {
                size,
                reason: format!("{err}, no pivoting is done"),
            })?;
        let solver = Self { ldl, size };

        // A zero pivot that slipped through shows up as inf/nan in a solve.
        let probe = solver.solve(&Vector::ones(size));
        if probe.iter().any(|v| !v.is_finite()) {
            return Err(AmgError::SingularCoarseOperator {
                size,
                reason: "factorization produced non-finite values".into(),
            });
        }
        Ok(solver)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn solve(&self, rhs: &Vector) -> Vector {
        let mut x = Vector::zeros(self.size);
        self.solve_into(rhs, &mut x);
        x
    }

    /// Solve without copying `rhs` when it is contiguous. sprs-ldl hands
    /// the solution back in a fresh `Vec`.
    pub fn solve_into(&self, rhs: &Vector, x: &mut Vector) {
        let solution = match rhs.as_slice() {
            Some(rhs) => self.ldl.solve(rhs),
            None => self.ldl.solve(rhs.to_vec()),
        };
        x.assign(&ArrayView1::from(&solution[..]));
    }
}

/// Host backend with rayon parallel kernels.
#[derive(Copy, Clone, Debug)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Matrix = CsrMatrix;
    type Vector = Vector;
    type DirectSolver = CoarseSolver;

    fn name() -> &'static str {
        "cpu"
    }

    fn matrix(a: CsrMatrix) -> CsrMatrix {
        a
    }

    fn vector(v: &Vector) -> Vector {
        v.clone()
    }

    fn to_host(v: &Vector) -> Vector {
        v.clone()
    }

    fn zeros(n: usize) -> Vector {
        Vector::zeros(n)
    }

    fn len(v: &Vector) -> usize {
        v.len()
    }

    fn rows(a: &CsrMatrix) -> usize {
        a.rows()
    }

    fn cols(a: &CsrMatrix) -> usize {
        a.cols()
    }

    fn nonzeros(a: &CsrMatrix) -> usize {
        a.nnz()
    }

    fn spmv(alpha: f64, a: &CsrMatrix, x: &Vector, beta: f64, y: &mut Vector) {
        parallel_ops::spmv(alpha, a, x, beta, y);
    }

    fn residual(rhs: &Vector, a: &CsrMatrix, x: &Vector, r: &mut Vector) {
        parallel_ops::residual(rhs, a, x, r);
    }

    fn axpby(a: f64, x: &Vector, b: f64, y: &mut Vector) {
        parallel_ops::axpby(a, x, b, y);
    }

    fn element_div(x: &mut Vector, d: &Vector) {
        parallel_ops::element_div(x, d);
    }

    fn inner_product(x: &Vector, y: &Vector) -> f64 {
        parallel_ops::inner_product(x, y)
    }

    fn scale(x: &mut Vector, a: f64) {
        *x *= a;
    }

    fn clear(x: &mut Vector) {
        x.fill(0.0);
    }

    fn copy(src: &Vector, dst: &mut Vector) {
        dst.assign(src);
    }

    fn direct_solver(a: &CsrMatrix) -> Result<CoarseSolver> {
        CoarseSolver::new(a)
    }

    fn direct_solve(solver: &CoarseSolver, rhs: &Vector, x: &mut Vector) {
        solver.solve_into(rhs, x);
    }
}

/// Host backend that never leaves the calling thread.
#[derive(Copy, Clone, Debug)]
pub struct SerialBackend;

impl Backend for SerialBackend {
    type Matrix = CsrMatrix;
    type Vector = Vector;
    type DirectSolver = CoarseSolver;

    fn name() -> &'static str {
        "serial"
    }

    fn matrix(a: CsrMatrix) -> CsrMatrix {
        a
    }

    fn vector(v: &Vector) -> Vector {
        v.clone()
    }

    fn to_host(v: &Vector) -> Vector {
        v.clone()
    }

    fn zeros(n: usize) -> Vector {
        Vector::zeros(n)
    }

    fn len(v: &Vector) -> usize {
        v.len()
    }

    fn rows(a: &CsrMatrix) -> usize {
        a.rows()
    }

    fn cols(a: &CsrMatrix) -> usize {
        a.cols()
    }

    fn nonzeros(a: &CsrMatrix) -> usize {
        a.nnz()
    }

    fn spmv(alpha: f64, a: &CsrMatrix, x: &Vector, beta: f64, y: &mut Vector) {
        for (row, yi) in a.outer_iterator().zip(y.iter_mut()) {
            let ax: f64 = row.iter().map(|(j, val)| val * x[j]).sum();
            *yi = if beta == 0.0 {
                alpha * ax
            } else {
                alpha * ax + beta * *yi
            };
        }
    }

    fn residual(rhs: &Vector, a: &CsrMatrix, x: &Vector, r: &mut Vector) {
        r.assign(rhs);
        Self::spmv(-1.0, a, x, 1.0, r);
    }

    fn axpby(a: f64, x: &Vector, b: f64, y: &mut Vector) {
        y.zip_mut_with(x, |yi, xi| *yi = a * xi + b * *yi);
    }

    fn element_div(x: &mut Vector, d: &Vector) {
        *x /= d;
    }

    fn inner_product(x: &Vector, y: &Vector) -> f64 {
        x.dot(y)
    }

    fn scale(x: &mut Vector, a: f64) {
        *x *= a;
    }

    fn clear(x: &mut Vector) {
        x.fill(0.0);
    }

    fn copy(src: &Vector, dst: &mut Vector) {
        dst.assign(src);
    }

    fn direct_solver(a: &CsrMatrix) -> Result<CoarseSolver> {
        CoarseSolver::new(a)
    }

    fn direct_solve(solver: &CoarseSolver, rhs: &Vector, x: &mut Vector) {
        solver.solve_into(rhs, x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{diagonal_matrix, poisson_1d, poisson_2d, random_vec};
    use approx::assert_abs_diff_eq;

    #[test]
    fn direct_solve_is_exact() {
        let a = poisson_2d(8, 1.0, 3.0);
        let solver = CoarseSolver::new(&a).unwrap();
        assert_eq!(solver.size(), 64);
        for _ in 0..3 {
            let v = random_vec(64);
            let av = &a * &v;
            let mut x = Vector::zeros(64);
            CpuBackend::direct_solve(&solver, &av, &mut x);
            assert_abs_diff_eq!(x, v, epsilon = 1e-10);
        }
    }

    #[test]
    fn singular_matrix_is_reported() {
        let a = diagonal_matrix(&[1.0, 0.0, 2.0]);
        match CoarseSolver::new(&a) {
            Err(AmgError::SingularCoarseOperator { size, .. }) => assert_eq!(size, 3),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("singular matrix was factorized"),
        }
    }

    #[test]
    fn nonsymmetric_matrix_is_rejected() {
        let mut tri = sprs::TriMat::new((3, 3));
        for (i, j, v) in [(0, 0, 2.0), (0, 1, 1.0), (1, 1, 2.0), (1, 2, 1.0), (2, 2, 2.0)] {
            tri.add_triplet(i, j, v);
        }
        let a: CsrMatrix = tri.to_csr();
        assert!(asymmetry(&a) > 0.5);
        match CoarseSolver::new(&a) {
            Err(AmgError::InvalidMatrix(msg)) => assert!(msg.contains("not symmetric"), "{msg}"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("upper triangular matrix was factorized"),
        }
    }

    #[test]
    fn rounding_asymmetry_is_tolerated() {
        let mut a = poisson_1d(20);
        if let Some(v) = a.get_mut(4, 5) {
            *v *= 1.0 + 1e-14;
        }
        let solver = CoarseSolver::new(&a).unwrap();
        let v = random_vec(20);
        assert_abs_diff_eq!(solver.solve(&(&a * &v)), v, epsilon = 1e-9);
    }

    #[test]
    fn backends_agree() {
        let a = poisson_1d(50);
        let x = random_vec(50);
        let mut y_cpu = random_vec(50);
        let mut y_serial = y_cpu.clone();
        CpuBackend::spmv(0.5, &a, &x, 2.0, &mut y_cpu);
        SerialBackend::spmv(0.5, &a, &x, 2.0, &mut y_serial);
        assert_abs_diff_eq!(y_cpu, y_serial, epsilon = 1e-12);

        assert_abs_diff_eq!(
            CpuBackend::inner_product(&x, &y_cpu),
            SerialBackend::inner_product(&x, &y_serial),
            epsilon = 1e-10
        );

        CpuBackend::axpby(1.5, &x, -0.5, &mut y_cpu);
        SerialBackend::axpby(1.5, &x, -0.5, &mut y_serial);
        assert_abs_diff_eq!(y_cpu, y_serial, epsilon = 1e-12);

        let d = Vector::from_elem(50, 4.0);
        CpuBackend::element_div(&mut y_cpu, &d);
        SerialBackend::element_div(&mut y_serial, &d);
        assert_abs_diff_eq!(y_cpu, y_serial, epsilon = 1e-12);

        let mut r_cpu = Vector::zeros(50);
        let mut r_serial = Vector::zeros(50);
        CpuBackend::residual(&y_cpu, &a, &x, &mut r_cpu);
        SerialBackend::residual(&y_serial, &a, &x, &mut r_serial);
        assert_abs_diff_eq!(r_cpu, r_serial, epsilon = 1e-12);
    }

    #[test]
    fn vector_helpers() {
        let v = Vector::from(vec![1.0, -2.0]);
        let mut w = CpuBackend::vector(&v);
        CpuBackend::scale(&mut w, 3.0);
        assert_eq!(CpuBackend::to_host(&w), Vector::from(vec![3.0, -6.0]));
        CpuBackend::copy(&v, &mut w);
        assert_eq!(w, v);
        CpuBackend::clear(&mut w);
        assert_eq!(CpuBackend::len(&w), 2);
        assert!(w.iter().all(|x| *x == 0.0));
    }
}
