//! Outer iterations that use the hierarchy as a preconditioner.

use crate::backend::Backend;
use crate::hierarchy::Hierarchy;

/// Outcome of a solve.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveInfo {
    pub converged: bool,
    pub iterations: usize,
    /// `‖r‖ / ‖r₀‖` at exit.
    pub relative_residual: f64,
    /// Relative residual after every iteration, starting with `1.0`.
    pub history: Vec<f64>,
}

impl SolveInfo {
    fn finish(converged: bool, history: Vec<f64>) -> Self {
        let iterations = history.len() - 1;
        let relative_residual = history.last().copied().unwrap_or(0.0);
        if converged {
            info!("converged in {iterations} iterations, relative residual {relative_residual:.3e}");
        } else {
            warn!(
                "not converged after {iterations} iterations, relative residual {relative_residual:.3e}"
            );
        }
        Self {
            converged,
            iterations,
            relative_residual,
            history,
        }
    }
}

/// Stationary iteration `x ← cycle(x)`. Solves `Ax = b` where `A` is the
/// finest matrix of `hierarchy` and `rhs` is `b`, starting from the value
/// in `x`, until the residual has dropped by a factor of `epsilon`.
pub fn stationary<B: Backend>(
    hierarchy: &mut Hierarchy<B>,
    rhs: &B::Vector,
    x: &mut B::Vector,
    max_iter: usize,
    epsilon: f64,
) -> SolveInfo {
    let mut r = B::zeros(B::len(rhs));
    B::residual(rhs, hierarchy.level(0).matrix(), x, &mut r);
    let r0_norm = B::inner_product(&r, &r).sqrt();
    let mut history = vec![1.0];
    if r0_norm == 0.0 {
        return SolveInfo::finish(true, history);
    }

    for iter in 1..=max_iter {
        hierarchy.cycle(rhs, x);
        B::residual(rhs, hierarchy.level(0).matrix(), x, &mut r);
        let relative = B::inner_product(&r, &r).sqrt() / r0_norm;
        history.push(relative);

        if iter % 10 == 0 {
            trace!("relative residual iter {iter}: {relative:.3e}");
        }
        if relative < epsilon {
            return SolveInfo::finish(true, history);
        }
    }

    SolveInfo::finish(false, history)
}

/// Preconditioned conjugate gradient with one cycle of `hierarchy` as the
/// preconditioner. The cycle is a fixed symmetric operator when the
/// K-cycle is off, otherwise it varies slightly between applications and
/// the iteration behaves like flexible CG for small iteration counts.
pub fn pcg<B: Backend>(
    hierarchy: &mut Hierarchy<B>,
    rhs: &B::Vector,
    x: &mut B::Vector,
    max_iter: usize,
    epsilon: f64,
) -> SolveInfo {
    let n = B::len(rhs);
    let mut r = B::zeros(n);
    B::residual(rhs, hierarchy.level(0).matrix(), x, &mut r);
    let r0_norm = B::inner_product(&r, &r).sqrt();
    let mut history = vec![1.0];
    if r0_norm == 0.0 {
        return SolveInfo::finish(true, history);
    }

    let mut z = B::zeros(n);
    hierarchy.cycle(&r, &mut z);
    let mut d = B::inner_product(&r, &z);
    let mut p = z.clone();
    let mut g = B::zeros(n);

    for iter in 1..=max_iter {
        B::spmv(1.0, hierarchy.level(0).matrix(), &p, 0.0, &mut g);
        let pg = B::inner_product(&p, &g);
        if pg == 0.0 {
            warn!("search direction vanished at iter {iter}");
            break;
        }
        let alpha = d / pg;
        B::axpby(alpha, &p, 1.0, x);
        B::axpby(-alpha, &g, 1.0, &mut r);

        let relative = B::inner_product(&r, &r).sqrt() / r0_norm;
        history.push(relative);
        if iter % 10 == 0 {
            trace!("relative residual iter {iter}: {relative:.3e}");
        }
        if relative < epsilon {
            return SolveInfo::finish(true, history);
        }

        B::clear(&mut z);
        hierarchy.cycle(&r, &mut z);
        let d_old = d;
        d = B::inner_product(&r, &z);
        B::axpby(1.0, &z, d / d_old, &mut p);
    }

    SolveInfo::finish(false, history)
}
