use std::path::PathBuf;
use std::time::Instant;

use amg_agg::{
    backend::{Backend, CpuBackend, SerialBackend},
    hierarchy::Hierarchy,
    params::AmgParams,
    solver::{pcg, stationary, SolveInfo},
    utils::{format_duration, load_system, load_vec, save_vec},
    AmgError, CsrMatrix, Vector,
};
use structopt::StructOpt;
use strum_macros::{Display, EnumString};

#[macro_use]
extern crate log;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "amg_agg_solve",
    about = "Solve a sparse system with aggregation AMG"
)]
struct Opt {
    /// Matrix file in matrix market format
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Right hand side, whitespace separated values. Defaults to A * 1
    #[structopt(long, parse(from_os_str))]
    rhs: Option<PathBuf>,

    /// Write the solution here in matrix market array format
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// JSON file with hierarchy and cycle parameters
    #[structopt(long, parse(from_os_str))]
    params: Option<PathBuf>,

    /// Use the K-cycle on every level that is a multiple of this
    #[structopt(long)]
    kcycle: Option<usize>,

    /// Maximum number of iterations to perform
    #[structopt(long, default_value = "100")]
    max_iter: usize,

    /// Stop once the relative residual is below this
    #[structopt(long, default_value = "1e-8")]
    tolerance: f64,

    /// Outer iteration. Options are: pcg, stationary
    #[structopt(long, default_value = "pcg")]
    solver: SolverArg,

    /// Options are: cpu, serial
    #[structopt(long, default_value = "cpu")]
    backend: BackendArg,

    /// Worker threads for the cpu backend, all cores by default
    #[structopt(long)]
    threads: Option<usize>,
}

#[derive(Debug, Display, EnumString)]
#[strum(ascii_case_insensitive)]
enum SolverArg {
    Pcg,
    Stationary,
}

#[derive(Debug, Display, EnumString)]
#[strum(ascii_case_insensitive)]
enum BackendArg {
    Cpu,
    Serial,
}

fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let threads = opt.threads.unwrap_or_else(num_cpus::get);
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        warn!("could not configure {threads} threads: {err}");
    }

    if let Err(err) = run(&opt) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<(), AmgError> {
    let mut params = match &opt.params {
        Some(path) => AmgParams::from_json_file(path)?,
        None => AmgParams::default(),
    };
    if let Some(kcycle) = opt.kcycle {
        params.cycle.kcycle = kcycle;
    }
    params.validate()?;
    debug!("{:?}", params);

    let mat = load_system(&opt.input)?;
    let rhs = match &opt.rhs {
        Some(path) => load_vec(path)?,
        None => &mat * &Vector::ones(mat.cols()),
    };
    if rhs.len() != mat.rows() {
        return Err(AmgError::InvalidMatrix(format!(
            "right hand side has {} entries, matrix has {} rows",
            rhs.len(),
            mat.rows()
        )));
    }

    let info = match opt.backend {
        BackendArg::Cpu => solve::<CpuBackend>(opt, mat, &rhs, &params)?,
        BackendArg::Serial => solve::<SerialBackend>(opt, mat, &rhs, &params)?,
    };
    info!(
        "{} {} after {} iterations, relative residual {:.3e}",
        opt.solver,
        if info.converged { "converged" } else { "stopped" },
        info.iterations,
        info.relative_residual
    );
    Ok(())
}

fn solve<B: Backend>(
    opt: &Opt,
    mat: CsrMatrix,
    rhs: &Vector,
    params: &AmgParams,
) -> Result<SolveInfo, AmgError> {
    let timer = Instant::now();
    let mut hierarchy = Hierarchy::<B>::new(mat, params)?;
    info!(
        "Hierarchy built in {} with {} backend: {:?}",
        format_duration(&timer.elapsed()),
        B::name(),
        hierarchy
    );

    let rhs = B::vector(rhs);
    let mut x = B::zeros(B::len(&rhs));
    let timer = Instant::now();
    let info = match opt.solver {
        SolverArg::Pcg => pcg(&mut hierarchy, &rhs, &mut x, opt.max_iter, opt.tolerance),
        SolverArg::Stationary => {
            stationary(&mut hierarchy, &rhs, &mut x, opt.max_iter, opt.tolerance)
        }
    };
    info!("Solved in: {} ms.", timer.elapsed().as_millis());
    debug!(
        "final residual norm {:.3e}",
        hierarchy.residual_norm(&rhs, &x)
    );
    if let Some(path) = &opt.output {
        save_vec(path, &B::to_host(&x))?;
        info!("solution written to {}", path.display());
    }
    Ok(info)
}
