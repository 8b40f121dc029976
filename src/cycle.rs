//! Multigrid cycles over a [`Hierarchy`].
//!
//! The V-cycle smooths with damped Jacobi, restricts the residual, solves
//! for a correction on the next level and prolongates it back. Levels
//! selected by `kcycle` are instead visited with two steps of flexible CG
//! preconditioned by their own V-cycle, which keeps the convergence of
//! plain aggregation from degrading as the hierarchy gets deeper.
//!
//! The recursion walks `&[Level]` and `&mut [Scratch]` slices in lockstep,
//! peeling off one level at a time, so every level only ever borrows its own
//! scratch vectors and those of the levels below it.

use crate::backend::Backend;
use crate::hierarchy::{Hierarchy, Level, Operator};
use crate::params::CycleParams;

struct Krylov<B: Backend> {
    r: B::Vector,
    s: B::Vector,
    p: B::Vector,
    q: B::Vector,
}

struct Work<B: Backend> {
    t: B::Vector,
    krylov: Option<Krylov<B>>,
}

/// Vectors owned by one level. `f` and `u` hold the right hand side and
/// correction handed down from the level above, so they are empty on the
/// finest level where the caller supplies both.
struct Scratch<B: Backend> {
    f: B::Vector,
    u: B::Vector,
    work: Work<B>,
}

/// Scratch space for one cycle in flight.
pub struct Workspace<B: Backend> {
    levels: Vec<Scratch<B>>,
}

impl<B: Backend> Workspace<B> {
    pub(crate) fn new(levels: &[Level<B>], params: &CycleParams) -> Self {
        let last = levels.len().saturating_sub(1);
        let levels = levels
            .iter()
            .enumerate()
            .map(|(k, lvl)| {
                let n = lvl.rows();
                let handed_down = if k == 0 { 0 } else { n };
                let krylov = (params.is_kcycle_level(k) && k < last).then(|| Krylov {
                    r: B::zeros(n),
                    s: B::zeros(n),
                    p: B::zeros(n),
                    q: B::zeros(n),
                });
                Scratch {
                    f: B::zeros(handed_down),
                    u: B::zeros(handed_down),
                    work: Work {
                        t: B::zeros(n),
                        krylov,
                    },
                }
            })
            .collect();
        Self { levels }
    }

    /// Levels that run the K-cycle.
    pub fn kcycle_levels(&self) -> Vec<usize> {
        self.levels
            .iter()
            .enumerate()
            .filter(|(_, s)| s.work.krylov.is_some())
            .map(|(k, _)| k)
            .collect()
    }
}

impl<B: Backend> Hierarchy<B> {
    /// Apply one multigrid cycle to `x` for the right hand side `rhs`,
    /// using the scratch owned by the hierarchy.
    pub fn cycle(&mut self, rhs: &B::Vector, x: &mut B::Vector) {
        run(&self.params.cycle, &self.levels, &mut self.workspace, rhs, x);
    }

    /// Same as [`cycle`](Self::cycle) with caller owned scratch, so several
    /// cycles can run over one hierarchy at the same time.
    pub fn cycle_with(&self, workspace: &mut Workspace<B>, rhs: &B::Vector, x: &mut B::Vector) {
        run(&self.params.cycle, &self.levels, workspace, rhs, x);
    }

    /// Fresh scratch space for [`cycle_with`](Self::cycle_with).
    pub fn workspace(&self) -> Workspace<B> {
        Workspace::new(&self.levels, &self.params.cycle)
    }

    /// `‖rhs - A x‖₂` on the finest level.
    pub fn residual_norm(&self, rhs: &B::Vector, x: &B::Vector) -> f64 {
        let mut r = B::zeros(B::len(rhs));
        B::residual(rhs, &self.levels[0].a, x, &mut r);
        B::inner_product(&r, &r).sqrt()
    }
}

fn run<B: Backend>(
    prm: &CycleParams,
    levels: &[Level<B>],
    workspace: &mut Workspace<B>,
    rhs: &B::Vector,
    x: &mut B::Vector,
) {
    assert_eq!(
        workspace.levels.len(),
        levels.len(),
        "workspace was created for another hierarchy"
    );
    assert_eq!(B::len(rhs), levels[0].rows());
    assert_eq!(B::len(x), B::cols(&levels[0].a));

    if let Some((top, below)) = workspace.levels.split_first_mut() {
        vcycle(prm, levels, &mut top.work.t, below, rhs, x);
    }
}

/// `x += ω D⁻¹ (rhs - A x)`
fn relax<B: Backend>(
    a: &B::Matrix,
    diag: &B::Vector,
    omega: f64,
    rhs: &B::Vector,
    x: &mut B::Vector,
    t: &mut B::Vector,
) {
    B::residual(rhs, a, x, t);
    B::element_div(t, diag);
    B::axpby(omega, t, 1.0, x);
}

/// V-cycle on `levels[0]`. `below` holds the scratch of `levels[1..]`.
fn vcycle<B: Backend>(
    prm: &CycleParams,
    levels: &[Level<B>],
    t: &mut B::Vector,
    below: &mut [Scratch<B>],
    rhs: &B::Vector,
    x: &mut B::Vector,
) {
    let Some((lvl, coarser)) = levels.split_first() else {
        return;
    };
    let (p, r, diag) = match &lvl.op {
        Operator::Transfer { p, r, diag } => (p, r, diag),
        Operator::Direct(solver) => {
            B::direct_solve(solver, rhs, x);
            return;
        }
    };
    let (Some(nxt), Some((scratch, deeper))) = (coarser.first(), below.split_first_mut()) else {
        return;
    };
    let Scratch { f, u, work } = scratch;

    for _ in 0..prm.ncycle {
        for _ in 0..prm.npre {
            relax::<B>(&lvl.a, diag, prm.relax_weight, rhs, x, t);
        }

        B::residual(rhs, &lvl.a, x, t);
        B::spmv(1.0, r, t, 0.0, f);
        B::clear(u);

        match &nxt.op {
            Operator::Direct(solver) => B::direct_solve(solver, f, u),
            Operator::Transfer { .. } if work.krylov.is_some() => {
                kcycle(prm, coarser, work, deeper, f, u)
            }
            Operator::Transfer { .. } => vcycle(prm, coarser, &mut work.t, deeper, f, u),
        }

        B::spmv(1.0, p, u, 1.0, x);

        for _ in 0..prm.npost {
            relax::<B>(&lvl.a, diag, prm.relax_weight, rhs, x, t);
        }
    }
}

/// Two steps of flexible CG on `levels[0]`, preconditioned by its V-cycle.
fn kcycle<B: Backend>(
    prm: &CycleParams,
    levels: &[Level<B>],
    work: &mut Work<B>,
    below: &mut [Scratch<B>],
    rhs: &B::Vector,
    x: &mut B::Vector,
) {
    let Work { t, krylov } = work;
    let (Some(lvl), Some(k)) = (levels.first(), krylov.as_mut()) else {
        return vcycle(prm, levels, t, below, rhs, x);
    };

    B::copy(rhs, &mut k.r);
    let mut rho_prev = 0.0;
    for iter in 0..2 {
        B::clear(&mut k.s);
        vcycle(prm, levels, t, below, &k.r, &mut k.s);

        let rho = B::inner_product(&k.r, &k.s);
        if iter == 0 || rho_prev == 0.0 {
            B::copy(&k.s, &mut k.p);
        } else {
            B::scale(&mut k.p, rho / rho_prev);
            B::axpby(1.0, &k.s, 1.0, &mut k.p);
        }

        B::spmv(1.0, &lvl.a, &k.p, 0.0, &mut k.q);
        let qp = B::inner_product(&k.q, &k.p);
        if qp == 0.0 {
            break;
        }
        let alpha = rho / qp;
        B::axpby(alpha, &k.p, 1.0, x);
        B::axpby(-alpha, &k.q, 1.0, &mut k.r);
        rho_prev = rho;
    }
}
