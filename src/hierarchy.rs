use core::fmt;

use crate::aggregates::Aggregates;
use crate::backend::Backend;
use crate::coarsening::{asymmetry, diagonal, galerkin, transfer_operators, SYMMETRY_TOL};
use crate::cycle::Workspace;
use crate::error::{AmgError, Result};
use crate::interpolation::{prolongation, restriction};
use crate::params::AmgParams;
use crate::CsrMatrix;

/// How a level passes work to the next one.
pub enum Operator<B: Backend> {
    /// Piecewise constant transfer to the next level and the diagonal used
    /// by the smoother.
    Transfer {
        p: B::Matrix,
        r: B::Matrix,
        diag: B::Vector,
    },
    /// Coarsest level, solved exactly.
    Direct(B::DirectSolver),
}

/// One level of the hierarchy.
pub struct Level<B: Backend> {
    pub(crate) a: B::Matrix,
    pub(crate) op: Operator<B>,
    rows: usize,
    nnz: usize,
}

impl<B: Backend> Level<B> {
    fn transfer(a: CsrMatrix, p: CsrMatrix, r: CsrMatrix, diag: &crate::Vector) -> Self {
        let a = B::matrix(a);
        let (rows, nnz) = (B::rows(&a), B::nonzeros(&a));
        Self {
            a,
            op: Operator::Transfer {
                p: B::matrix(p),
                r: B::matrix(r),
                diag: B::vector(diag),
            },
            rows,
            nnz,
        }
    }

    fn direct(a: CsrMatrix, solver: B::DirectSolver) -> Self {
        let a = B::matrix(a);
        let (rows, nnz) = (B::rows(&a), B::nonzeros(&a));
        Self {
            a,
            op: Operator::Direct(solver),
            rows,
            nnz,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn nnz(&self) -> usize {
        self.nnz
    }

    pub fn matrix(&self) -> &B::Matrix {
        &self.a
    }

    pub fn operator(&self) -> &Operator<B> {
        &self.op
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.op, Operator::Direct(_))
    }
}

/// Steps of the setup. The last matrix of `Building` is the input of the
/// next step, so ownership moves down the hierarchy.
enum BuildState {
    Building(CsrMatrix),
    Finalizing(CsrMatrix),
    Ready,
}

/// Levels of an aggregation AMG solver together with the scratch space
/// needed to cycle over them.
pub struct Hierarchy<B: Backend> {
    pub(crate) levels: Vec<Level<B>>,
    pub(crate) params: AmgParams,
    aggregates: Vec<Aggregates>,
    pub(crate) workspace: Workspace<B>,
}

impl<B: Backend> fmt::Debug for Hierarchy<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes = self.get_dims();
        let nnzs = self.get_nnzs();
        let total_nnz = nnzs.iter().sum::<usize>();
        let coarsening_factors: Vec<f32> = sizes
            .iter()
            .zip(sizes.iter().skip(1))
            .map(|(a, b)| (*a as f32) / (*b as f32))
            .collect();

        f.debug_struct("Hierarchy")
            .field("levels", &self.levels())
            .field("sizes", &sizes)
            .field("coarsening_factors", &coarsening_factors)
            .field("nnz", &nnzs)
            .field("total_nnz_and_complexity", &(total_nnz, self.op_complexity()))
            .finish()
    }
}

impl<B: Backend> Hierarchy<B> {
    /// Build the hierarchy for `mat`, consuming it.
    pub fn new(mat: CsrMatrix, params: &AmgParams) -> Result<Self> {
        params.validate()?;
        check_input(&mat)?;
        trace!(
            "building hierarchy with {} backend for {} rows, {} nnz",
            B::name(),
            mat.rows(),
            mat.nnz()
        );

        let (levels, aggregates) = build::<B>(mat, params)?;
        let workspace = Workspace::new(&levels, &params.cycle);
        let hierarchy = Self {
            levels,
            params: *params,
            aggregates,
            workspace,
        };
        info!(
            "hierarchy ready: {} levels, sizes {:?}, complexity {:.3}",
            hierarchy.levels(),
            hierarchy.get_dims(),
            hierarchy.op_complexity()
        );
        Ok(hierarchy)
    }

    /// Recompute every operator for a matrix with new values, keeping the
    /// aggregation of the current hierarchy. On error the hierarchy is left
    /// untouched.
    pub fn rebuild(&mut self, mat: CsrMatrix) -> Result<()> {
        check_input(&mat)?;
        if mat.rows() != self.levels[0].rows() {
            return Err(AmgError::InvalidMatrix(format!(
                "hierarchy was built for {} rows, got {}",
                self.levels[0].rows(),
                mat.rows()
            )));
        }

        let mut levels: Vec<Level<B>> = Vec::with_capacity(self.levels.len());
        let mut a = mat;
        for (level, aggregates) in self.aggregates.iter().enumerate() {
            let p = prolongation(aggregates);
            let r = restriction(&p);
            let coarse = galerkin(&a, &p, &r, self.params.over_interp);
            let diag = smoothing_diagonal(&a, level)?;
            trace!("rebuilt level {level}: {} -> {} rows", a.rows(), coarse.rows());
            levels.push(Level::transfer(a, p, r, &diag));
            a = coarse;
        }
        let solver = B::direct_solver(&a)?;
        levels.push(Level::direct(a, solver));

        self.workspace = Workspace::new(&levels, &self.params.cycle);
        self.levels = levels;
        debug!("hierarchy rebuilt, complexity {:.3}", self.op_complexity());
        Ok(())
    }

    /// Number of levels, the coarsest included.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Level<B> {
        &self.levels[level]
    }

    /// Aggregation that produced level `level + 1` from level `level`.
    pub fn aggregates(&self, level: usize) -> &Aggregates {
        &self.aggregates[level]
    }

    pub fn params(&self) -> &AmgParams {
        &self.params
    }

    pub fn get_dims(&self) -> Vec<usize> {
        self.levels.iter().map(|lvl| lvl.rows()).collect()
    }

    pub fn get_nnzs(&self) -> Vec<usize> {
        self.levels.iter().map(|lvl| lvl.nnz()).collect()
    }

    /// Total nnz / finest level nnz
    pub fn op_complexity(&self) -> f64 {
        let total = self.get_nnzs().iter().sum::<usize>() as f64;
        total / (self.levels[0].nnz() as f64)
    }
}

fn check_input(mat: &CsrMatrix) -> Result<()> {
    if mat.rows() != mat.cols() {
        return Err(AmgError::InvalidMatrix(format!(
            "matrix must be square, got {}x{}",
            mat.rows(),
            mat.cols()
        )));
    }
    if mat.rows() == 0 {
        return Err(AmgError::InvalidMatrix("matrix is empty".into()));
    }
    if !mat.is_csr() {
        return Err(AmgError::InvalidMatrix("matrix must be in CSR storage".into()));
    }
    let skew = asymmetry(mat);
    if skew > SYMMETRY_TOL {
        return Err(AmgError::InvalidMatrix(format!(
            "matrix must be symmetric, relative asymmetry is {skew:.3e}"
        )));
    }
    Ok(())
}

fn smoothing_diagonal(mat: &CsrMatrix, level: usize) -> Result<crate::Vector> {
    let diag = diagonal(mat);
    match diag.iter().position(|d| *d == 0.0) {
        Some(row) => Err(AmgError::ZeroDiagonal { level, row }),
        None => Ok(diag),
    }
}

fn build<B: Backend>(mat: CsrMatrix, params: &AmgParams) -> Result<(Vec<Level<B>>, Vec<Aggregates>)> {
    let mut levels: Vec<Level<B>> = Vec::new();
    let mut all_aggregates = Vec::new();
    let mut state = BuildState::Building(mat);

    loop {
        state = match state {
            BuildState::Building(a) => {
                let level = levels.len();
                if a.rows() <= params.min_coarse_size || level + 1 >= params.max_levels {
                    BuildState::Finalizing(a)
                } else {
                    let (aggregates, p, r) = transfer_operators(&a, &params.aggregation);
                    let (fine, coarse) = (a.rows(), aggregates.count);
                    let stalled = coarse as f64 > params.stall_ratio * fine as f64;

                    if coarse == 0 || (stalled && level == 0) {
                        return Err(AmgError::DegenerateCoarsening {
                            level,
                            fine,
                            coarse,
                        });
                    }
                    if stalled {
                        warn!(
                            "coarsening stalled on level {level} ({fine} -> {coarse} rows), \
                             solving it directly"
                        );
                        BuildState::Finalizing(a)
                    } else {
                        let a_coarse = galerkin(&a, &p, &r, params.over_interp);
                        let diag = smoothing_diagonal(&a, level)?;
                        debug!(
                            "level {level}: {fine} rows, {} nnz -> {coarse} rows, {} nnz",
                            a.nnz(),
                            a_coarse.nnz()
                        );
                        levels.push(Level::transfer(a, p, r, &diag));
                        all_aggregates.push(aggregates);
                        BuildState::Building(a_coarse)
                    }
                }
            }
            BuildState::Finalizing(a) => {
                debug!(
                    "coarsest level {}: {} rows, {} nnz",
                    levels.len(),
                    a.rows(),
                    a.nnz()
                );
                let solver = B::direct_solver(&a)?;
                levels.push(Level::direct(a, solver));
                BuildState::Ready
            }
            BuildState::Ready => break,
        };
    }

    Ok((levels, all_aggregates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::params::IsolatedPolicy;
    use crate::utils::{diagonal_matrix, poisson_1d, poisson_2d};
    use test_generator::test_resources;

    fn small_coarse() -> AmgParams {
        AmgParams {
            min_coarse_size: 10,
            ..AmgParams::default()
        }
    }

    #[test_resources("test_matrices/*.mtx")]
    fn levels_shrink(mat_path: &str) {
        let mat = sprs::io::read_matrix_market::<f64, usize, _>(mat_path)
            .unwrap()
            .to_csr::<usize>();
        let fine_nnz = mat.nnz();
        let hierarchy = Hierarchy::<CpuBackend>::new(mat, &small_coarse()).unwrap();
        let dims = hierarchy.get_dims();
        assert!(hierarchy.levels() > 1);
        assert!(dims.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(hierarchy.get_nnzs()[0], fine_nnz);
        assert!(hierarchy.level(hierarchy.levels() - 1).is_terminal());
        for level in 0..hierarchy.levels() - 1 {
            assert!(!hierarchy.level(level).is_terminal());
            assert_eq!(hierarchy.aggregates(level).len(), dims[level]);
            assert_eq!(hierarchy.aggregates(level).count, dims[level + 1]);
        }
        assert!(hierarchy.op_complexity() > 1.0);
    }

    #[test]
    fn poisson_hierarchy_sizes() {
        let hierarchy =
            Hierarchy::<CpuBackend>::new(poisson_2d(32, 1.0, 1.0), &small_coarse()).unwrap();
        assert_eq!(hierarchy.get_dims()[0], 1024);
        assert!(*hierarchy.get_dims().last().unwrap() <= 10);
        let printed = format!("{:?}", hierarchy);
        assert!(printed.contains("coarsening_factors"));
    }

    #[test]
    fn small_matrix_is_a_single_level() {
        let hierarchy = Hierarchy::<CpuBackend>::new(poisson_1d(50), &AmgParams::default()).unwrap();
        assert_eq!(hierarchy.levels(), 1);
        assert!(hierarchy.level(0).is_terminal());
        assert_eq!(hierarchy.op_complexity(), 1.0);
    }

    #[test]
    fn level_count_is_capped() {
        let params = AmgParams {
            min_coarse_size: 1,
            max_levels: 2,
            ..AmgParams::default()
        };
        let hierarchy = Hierarchy::<CpuBackend>::new(poisson_1d(200), &params).unwrap();
        assert_eq!(hierarchy.levels(), 2);
    }

    #[test]
    fn disconnected_matrix_is_degenerate() {
        let mat = diagonal_matrix(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let params = AmgParams {
            min_coarse_size: 2,
            ..AmgParams::default()
        };
        match Hierarchy::<CpuBackend>::new(mat.clone(), &params) {
            Err(AmgError::DegenerateCoarsening { level, fine, coarse }) => {
                assert_eq!((level, fine, coarse), (0, 5, 5));
            }
            other => panic!("expected degenerate coarsening, got {:?}", other.err()),
        }

        let mut params = params;
        params.aggregation.isolated = IsolatedPolicy::Drop;
        match Hierarchy::<CpuBackend>::new(mat, &params) {
            Err(AmgError::DegenerateCoarsening { coarse, .. }) => assert_eq!(coarse, 0),
            other => panic!("expected degenerate coarsening, got {:?}", other.err()),
        }
    }

    #[test]
    fn singular_coarsest_level() {
        let params = AmgParams {
            max_levels: 1,
            ..AmgParams::default()
        };
        let result = Hierarchy::<CpuBackend>::new(diagonal_matrix(&[1.0, 0.0]), &params);
        assert!(matches!(
            result,
            Err(AmgError::SingularCoarseOperator { size: 2, .. })
        ));
    }

    #[test]
    fn zero_diagonal_is_reported() {
        let mut mat = poisson_1d(30);
        *mat.get_mut(3, 3).unwrap() = 0.0;
        let params = AmgParams {
            min_coarse_size: 2,
            ..AmgParams::default()
        };
        assert!(matches!(
            Hierarchy::<CpuBackend>::new(mat, &params),
            Err(AmgError::ZeroDiagonal { level: 0, row: 3 })
        ));
    }

    #[test]
    fn invalid_input_is_rejected() {
        let rect = CsrMatrix::new((2, 3), vec![0, 1, 2], vec![0, 1], vec![1.0, 1.0]);
        assert!(matches!(
            Hierarchy::<CpuBackend>::new(rect, &AmgParams::default()),
            Err(AmgError::InvalidMatrix(_))
        ));

        let params = AmgParams {
            over_interp: 0.9,
            ..AmgParams::default()
        };
        assert!(matches!(
            Hierarchy::<CpuBackend>::new(poisson_1d(10), &params),
            Err(AmgError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn nonsymmetric_matrix_is_rejected() {
        // [[2, 1, 0], [0, 2, 1], [0, 0, 2]] fits on a single level
        let mut tri = sprs::TriMat::new((3, 3));
        for (i, j, v) in [(0, 0, 2.0), (0, 1, 1.0), (1, 1, 2.0), (1, 2, 1.0), (2, 2, 2.0)] {
            tri.add_triplet(i, j, v);
        }
        let upper: CsrMatrix = tri.to_csr();
        match Hierarchy::<CpuBackend>::new(upper.clone(), &AmgParams::default()) {
            Err(AmgError::InvalidMatrix(msg)) => assert!(msg.contains("symmetric"), "{msg}"),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("nonsymmetric matrix was accepted"),
        }

        let mut hierarchy = Hierarchy::<CpuBackend>::new(poisson_1d(3), &AmgParams::default()).unwrap();
        assert!(matches!(hierarchy.rebuild(upper), Err(AmgError::InvalidMatrix(_))));
        let rhs = crate::Vector::from(vec![1.0, 0.0, 1.0]);
        let mut x = crate::Vector::zeros(3);
        hierarchy.cycle(&rhs, &mut x);
        assert!(hierarchy.residual_norm(&rhs, &x) < 1e-12);
    }

    #[test]
    fn rebuild_keeps_structure() {
        let mut hierarchy =
            Hierarchy::<CpuBackend>::new(poisson_2d(20, 1.0, 1.0), &small_coarse()).unwrap();
        let dims = hierarchy.get_dims();
        let nnzs = hierarchy.get_nnzs();
        let aggregates = hierarchy.aggregates(0).clone();

        hierarchy.rebuild(poisson_2d(20, 2.0, 0.5)).unwrap();
        assert_eq!(hierarchy.get_dims(), dims);
        assert_eq!(hierarchy.get_nnzs(), nnzs);
        assert_eq!(hierarchy.aggregates(0), &aggregates);

        assert!(matches!(
            hierarchy.rebuild(poisson_2d(10, 1.0, 1.0)),
            Err(AmgError::InvalidMatrix(_))
        ));
        assert_eq!(hierarchy.get_dims(), dims);
    }
}
