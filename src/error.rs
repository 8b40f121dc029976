//! Failures reported while building or rebuilding a hierarchy.
//!
//! None of these are retried internally. Once a [`Hierarchy`](crate::Hierarchy)
//! exists, cycling over it cannot fail.

/// Everything that can go wrong during setup.
#[derive(Debug, thiserror::Error)]
pub enum AmgError {
    /// The direct solver for the coarsest level could not be constructed.
    #[error("coarsest operator of size {size} could not be factorized: {reason}")]
    SingularCoarseOperator {
        /// Order of the coarsest matrix.
        size: usize,
        /// What the factorization reported.
        reason: String,
    },

    /// Aggregation produced no aggregates, or did not reduce the problem.
    #[error("coarsening of level {level} is degenerate: {fine} fine rows produced {coarse} aggregates")]
    DegenerateCoarsening {
        level: usize,
        fine: usize,
        coarse: usize,
    },

    /// A configuration value is outside its valid range.
    #[error("invalid parameter {name} = {value} (expected {expected})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The smoother needs a nonzero diagonal on every non-terminal level.
    #[error("zero diagonal entry in row {row} of level {level}")]
    ZeroDiagonal { level: usize, row: usize },

    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),

    /// Reading a parameter file or a linear system from disk failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AmgError {
    fn from(err: std::io::Error) -> Self {
        AmgError::Io(err.to_string())
    }
}

impl From<sprs::io::IoError> for AmgError {
    fn from(err: sprs::io::IoError) -> Self {
        AmgError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AmgError {
    fn from(err: serde_json::Error) -> Self {
        AmgError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AmgError>;
