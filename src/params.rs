//! Configuration of hierarchy construction and cycling.
//!
//! All defaults are spelled out in the `Default` impls. Parameters can be
//! loaded from JSON, where any missing field takes its default:
//!
//! ```json
//! { "eps_strong": 0.08, "kcycle": 2, "min_coarse_size": 500 }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{AmgError, Result};

/// What to do with a row that has no strong connections.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum IsolatedPolicy {
    /// The row becomes an aggregate of its own.
    #[default]
    Singleton,
    /// The row is left out of the coarse space (empty row of `P`).
    Drop,
}

/// Parameters of the aggregation step.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationParams {
    /// Threshold of the strength of connection test
    /// `|a_ij| >= eps_strong * sqrt(|a_ii * a_jj|)`.
    pub eps_strong: f64,
    pub isolated: IsolatedPolicy,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            eps_strong: 0.1,
            isolated: IsolatedPolicy::Singleton,
        }
    }
}

/// Parameters used while cycling.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleParams {
    /// Relaxations before the coarse grid correction.
    pub npre: usize,
    /// Relaxations after the coarse grid correction.
    pub npost: usize,
    /// Number of cycles per level visit.
    pub ncycle: usize,
    /// Levels whose index is a nonzero multiple of `kcycle` are visited
    /// with the K-cycle. Zero disables it.
    pub kcycle: usize,
    /// Damping of the Jacobi smoother.
    pub relax_weight: f64,
}

impl Default for CycleParams {
    fn default() -> Self {
        Self {
            npre: 1,
            npost: 1,
            ncycle: 1,
            kcycle: 0,
            relax_weight: 0.72,
        }
    }
}

impl CycleParams {
    /// Whether the level with index `level` uses K-cycle acceleration.
    pub fn is_kcycle_level(&self, level: usize) -> bool {
        self.kcycle > 0 && level > 0 && level % self.kcycle == 0
    }
}

/// Full configuration passed to [`Hierarchy::new`](crate::Hierarchy::new).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmgParams {
    #[serde(flatten)]
    pub aggregation: AggregationParams,

    /// Over-interpolation factor. The Galerkin operator is scaled by
    /// `1 / over_interp`, which amounts to scaling the piecewise constant
    /// coarse correction by `over_interp`.
    pub over_interp: f64,

    /// Maximum number of levels, the coarsest included.
    pub max_levels: usize,

    /// Coarsening stops once a level has at most this many rows.
    pub min_coarse_size: usize,

    /// Coarsening is considered stalled when a level keeps more than this
    /// fraction of its rows.
    pub stall_ratio: f64,

    #[serde(flatten)]
    pub cycle: CycleParams,
}

impl Default for AmgParams {
    fn default() -> Self {
        Self {
            aggregation: AggregationParams::default(),
            over_interp: 1.5,
            max_levels: 20,
            min_coarse_size: 300,
            stall_ratio: 0.9,
            cycle: CycleParams::default(),
        }
    }
}

impl AmgParams {
    /// Read parameters from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let params: Self = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    /// Reject values that would make the setup or the cycle meaningless.
    pub fn validate(&self) -> Result<()> {
        let eps = self.aggregation.eps_strong;
        if !eps.is_finite() || eps < 0.0 {
            return Err(invalid("eps_strong", eps, "a finite value >= 0"));
        }
        if !self.over_interp.is_finite() || self.over_interp < 1.0 {
            return Err(invalid("over_interp", self.over_interp, "a finite value >= 1"));
        }
        let omega = self.cycle.relax_weight;
        if !(omega > 0.0 && omega < 2.0) {
            return Err(invalid("relax_weight", omega, "a value in (0, 2)"));
        }
        if !(self.stall_ratio > 0.0 && self.stall_ratio <= 1.0) {
            return Err(invalid("stall_ratio", self.stall_ratio, "a value in (0, 1]"));
        }
        if self.max_levels == 0 {
            return Err(invalid("max_levels", self.max_levels, "at least 1"));
        }
        if self.cycle.ncycle == 0 {
            return Err(invalid("ncycle", self.cycle.ncycle, "at least 1"));
        }
        Ok(())
    }
}

fn invalid<T: ToString>(name: &'static str, value: T, expected: &'static str) -> AmgError {
    AmgError::InvalidParameter {
        name,
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults_are_valid() {
        let params = AmgParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.aggregation.eps_strong, 0.1);
        assert_eq!(params.over_interp, 1.5);
        assert_eq!(params.cycle.relax_weight, 0.72);
        assert_eq!(params.cycle.kcycle, 0);
        assert_eq!(params.aggregation.isolated, IsolatedPolicy::Singleton);
    }

    #[test]
    fn rejects_out_of_range() {
        let mut params = AmgParams::default();
        params.over_interp = 0.5;
        assert!(matches!(
            params.validate(),
            Err(AmgError::InvalidParameter {
                name: "over_interp",
                ..
            })
        ));

        let mut params = AmgParams::default();
        params.aggregation.eps_strong = -0.1;
        assert!(matches!(
            params.validate(),
            Err(AmgError::InvalidParameter {
                name: "eps_strong",
                ..
            })
        ));

        let mut params = AmgParams::default();
        params.cycle.relax_weight = f64::NAN;
        assert!(params.validate().is_err());

        let mut params = AmgParams::default();
        params.max_levels = 0;
        assert!(params.validate().is_err());

        let mut params = AmgParams::default();
        params.stall_ratio = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn json_missing_fields_take_defaults() {
        let params: AmgParams =
            serde_json::from_str(r#"{ "eps_strong": 0.05, "kcycle": 2, "isolated": "drop" }"#)
                .unwrap();
        assert_eq!(params.aggregation.eps_strong, 0.05);
        assert_eq!(params.aggregation.isolated, IsolatedPolicy::Drop);
        assert_eq!(params.cycle.kcycle, 2);
        assert_eq!(params.cycle.npre, 1);
        assert_eq!(params.over_interp, 1.5);
        assert_eq!(params.min_coarse_size, 300);
    }

    #[test]
    fn policy_from_str() {
        assert_eq!(IsolatedPolicy::from_str("Drop").unwrap(), IsolatedPolicy::Drop);
        assert_eq!(
            IsolatedPolicy::from_str("singleton").unwrap(),
            IsolatedPolicy::Singleton
        );
        assert_eq!(IsolatedPolicy::Drop.to_string(), "drop");
    }

    #[test]
    fn kcycle_levels() {
        let mut cycle = CycleParams::default();
        assert!(!cycle.is_kcycle_level(1));
        cycle.kcycle = 2;
        assert!(!cycle.is_kcycle_level(0));
        assert!(!cycle.is_kcycle_level(1));
        assert!(cycle.is_kcycle_level(2));
        assert!(cycle.is_kcycle_level(4));
    }
}
