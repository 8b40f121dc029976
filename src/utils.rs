//! Model problems, file loading and other helpers that don't have a specific
//! home.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    time::Duration,
};

use rand::distributions::{Distribution, Uniform};
use sprs::TriMat;

use crate::error::{AmgError, Result};
use crate::{CsrMatrix, Vector};

/// Uniformly distributed entries in `[-2, 2)`.
pub fn random_vec(size: usize) -> Vector {
    let mut rng = rand::thread_rng();
    let distribution = Uniform::new(-2.0_f64, 2.0_f64);
    Vector::from_shape_fn(size, |_| distribution.sample(&mut rng))
}

/// Second order finite differences for `-u''` on `n` interior points.
pub fn poisson_1d(n: usize) -> CsrMatrix {
    let mut tri = TriMat::with_capacity((n, n), 3 * n);
    for i in 0..n {
        if i > 0 {
            tri.add_triplet(i, i - 1, -1.0);
        }
        tri.add_triplet(i, i, 2.0);
        if i + 1 < n {
            tri.add_triplet(i, i + 1, -1.0);
        }
    }
    tri.to_csr()
}

/// Five point stencil for `-ax u_xx - ay u_yy` on an `m x m` grid with
/// Dirichlet boundaries. Unknown `(i, j)` has index `j * m + i`, so `i` runs
/// along the x direction. Small `ay / ax` gives an anisotropic problem.
pub fn poisson_2d(m: usize, ax: f64, ay: f64) -> CsrMatrix {
    let n = m * m;
    let mut tri = TriMat::with_capacity((n, n), 5 * n);
    for j in 0..m {
        for i in 0..m {
            let k = j * m + i;
            if j > 0 {
                tri.add_triplet(k, k - m, -ay);
            }
            if i > 0 {
                tri.add_triplet(k, k - 1, -ax);
            }
            tri.add_triplet(k, k, 2.0 * ax + 2.0 * ay);
            if i + 1 < m {
                tri.add_triplet(k, k + 1, -ax);
            }
            if j + 1 < m {
                tri.add_triplet(k, k + m, -ay);
            }
        }
    }
    tri.to_csr()
}

/// Diagonal matrix, zero entries included in the sparsity pattern.
pub fn diagonal_matrix(diag: &[f64]) -> CsrMatrix {
    let n = diag.len();
    CsrMatrix::new((n, n), (0..=n).collect(), (0..n).collect(), diag.to_vec())
}

/// Read a Matrix Market file into CSR storage.
pub fn load_system<P: AsRef<Path>>(path: P) -> Result<CsrMatrix> {
    info!("Loading linear system...");
    let mat: CsrMatrix = sprs::io::read_matrix_market::<f64, usize, _>(path)?.to_csr();
    trace!("loaded {}x{} matrix with {} nnz", mat.rows(), mat.cols(), mat.nnz());
    Ok(mat)
}

/// Read whitespace separated values, any number per line. Lines starting
/// with `%` are comments. After a `%%MatrixMarket ... array` banner the first
/// data line holds the dimensions and the entry count is checked against it.
pub fn load_vec<P: AsRef<Path>>(path: P) -> Result<Vector> {
    let reader = BufReader::new(File::open(path)?);
    let mut data = Vec::new();
    let mut array_banner = false;
    let mut expected = None;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if number == 0 && line.starts_with("%%MatrixMarket") {
            array_banner = line.split_whitespace().any(|t| t.eq_ignore_ascii_case("array"));
            continue;
        }
        if line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|err| AmgError::InvalidMatrix(format!("line {}: {err}", number + 1)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if array_banner && expected.is_none() {
            expected = Some(values.iter().map(|v| *v as usize).product::<usize>());
            continue;
        }
        data.extend(values);
    }

    match expected {
        Some(n) if n != data.len() => Err(AmgError::InvalidMatrix(format!(
            "vector file declares {n} entries, found {}",
            data.len()
        ))),
        _ => Ok(Vector::from(data)),
    }
}

/// Write `vec` as a Matrix Market dense column, readable by [`load_vec`].
pub fn save_vec<P: AsRef<Path>>(path: P, vec: &Vector) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "%%MatrixMarket matrix array real general")?;
    writeln!(writer, "{} 1", vec.len())?;
    for v in vec.iter() {
        writeln!(writer, "{v:e}")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn format_duration(duration: &Duration) -> String {
    let millis = duration.subsec_millis();
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let minutes = minutes % 60;
    let seconds = seconds % 60;

    format!("{hours} hours, {minutes} minutes, {seconds}.{millis:03} seconds")
}
