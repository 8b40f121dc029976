//! Aggregation based algebraic multigrid (AMG).
//!
//! <br>
//!
//! This library builds a hierarchy of progressively coarser linear systems
//! from a sparse matrix and applies multigrid cycles over that hierarchy to
//! approximately solve `Ax = b`. The intended targets are symmetric positive
//! definite matrices arising from discretizations of elliptic operators,
//! where a few cycles reduce the error by a constant factor independent of
//! the problem size.
//!
//! Coarsening is done by (non-smoothed) aggregation. Unknowns that are
//! strongly connected in the matrix graph are grouped into aggregates and
//! each aggregate becomes a single coarse unknown. The prolongation is the
//! piecewise constant 0/1 operator defined by that grouping and the coarse
//! matrix is the Galerkin product `R A P`, rescaled by an over-interpolation
//! factor which compensates for the poor approximation property of
//! piecewise constant interpolation.
//!
//! Two cycles are provided. The V-cycle does weighted Jacobi smoothing,
//! restricts the residual, recurses and prolongates the correction. The
//! K-cycle wraps the V-cycle of a level in two steps of flexible conjugate
//! gradients, which makes plain aggregation robust enough to be used with
//! many levels.
//!
//! ```no_run
//! use amg_agg::{backend::CpuBackend, hierarchy::Hierarchy, params::AmgParams, solver};
//!
//! let mat = amg_agg::utils::poisson_2d(64, 1.0, 1.0);
//! let rhs = amg_agg::Vector::ones(mat.rows());
//! let mut params = AmgParams::default();
//! params.cycle.kcycle = 2;
//!
//! let mut hierarchy = Hierarchy::<CpuBackend>::new(mat, &params)?;
//! let mut x = amg_agg::Vector::zeros(rhs.len());
//! let info = solver::pcg(&mut hierarchy, &rhs, &mut x, 100, 1e-8);
//! assert!(info.converged);
//! # Ok::<(), amg_agg::error::AmgError>(())
//! ```

use ndarray::Array1;
use sprs::CsMatBase;
use sprs_ldl::LdlNumeric;

#[macro_use]
extern crate log;
extern crate approx;

pub mod aggregates;
pub mod backend;
pub mod coarsening;
pub mod cycle;
pub mod error;
pub mod hierarchy;
pub mod interpolation;
pub mod parallel_ops;
pub mod params;
pub mod solver;
pub mod utils;

pub type CsrMatrix = CsMatBase<f64, usize, Vec<usize>, Vec<usize>, Vec<f64>, usize>;
pub type Vector = Array1<f64>;
pub type Cholesky = LdlNumeric<f64, usize>;

pub use error::{AmgError, Result};
pub use hierarchy::Hierarchy;
pub use params::AmgParams;
