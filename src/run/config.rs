//! Run configuration, loadable from YAML.
//!
//! ```yaml
//! input_mesh: m.mesh
//! input_solution: m.sol
//! output_mesh: out.mesh
//! output_solution: out.sol
//! verbosity: 5
//! optimize: true
//! hmin: 0.01
//! hmax: 0.5
//! imbalance_tolerance: 0.05
//! rebalance: auto
//! merge_tolerance: 1.0e-9
//! target_rank: 0
//! ```
//!
//! Every field is optional; missing fields take the defaults above (except
//! `optimize`, off by default, and `hmin`/`hmax`, unset by default).

use crate::mesh_error::MeshAdaptError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// When the Redistribute phase repartitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rebalance {
    /// Only when the element counts are out of balance.
    #[default]
    Auto,
    /// On every run.
    Always,
    /// Never; keep the initial partition.
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_input_mesh")]
    pub input_mesh: PathBuf,
    #[serde(default = "default_input_solution")]
    pub input_solution: PathBuf,
    #[serde(default = "default_output_mesh")]
    pub output_mesh: PathBuf,
    #[serde(default = "default_output_solution")]
    pub output_solution: PathBuf,

    /// Verbosity of the root process; other ranks always run at 0.
    #[serde(default = "default_verbosity")]
    pub verbosity: u8,

    /// Synthesize a size field when the input carries none.
    #[serde(default)]
    pub optimize: bool,
    /// Smallest admissible size, in physical units.
    #[serde(default)]
    pub hmin: Option<f64>,
    /// Largest admissible size, in physical units.
    #[serde(default)]
    pub hmax: Option<f64>,

    /// Repartition when `max / mean` element count exceeds `1 + tolerance`.
    #[serde(default = "default_imbalance_tolerance")]
    pub imbalance_tolerance: f64,
    #[serde(default)]
    pub rebalance: Rebalance,
    /// Largest coordinate or solution difference between copies of a shared
    /// vertex accepted by the merge.
    #[serde(default = "default_merge_tolerance")]
    pub merge_tolerance: f64,
    /// Rank receiving the merged mesh and writing the output.
    #[serde(default)]
    pub target_rank: usize,
}

fn default_input_mesh() -> PathBuf {
    PathBuf::from("m.mesh")
}
fn default_input_solution() -> PathBuf {
    PathBuf::from("m.sol")
}
fn default_output_mesh() -> PathBuf {
    PathBuf::from("out.mesh")
}
fn default_output_solution() -> PathBuf {
    PathBuf::from("out.sol")
}
fn default_verbosity() -> u8 {
    5
}
fn default_imbalance_tolerance() -> f64 {
    0.05
}
fn default_merge_tolerance() -> f64 {
    1e-9
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_mesh: default_input_mesh(),
            input_solution: default_input_solution(),
            output_mesh: default_output_mesh(),
            output_solution: default_output_solution(),
            verbosity: default_verbosity(),
            optimize: false,
            hmin: None,
            hmax: None,
            imbalance_tolerance: default_imbalance_tolerance(),
            rebalance: Rebalance::Auto,
            merge_tolerance: default_merge_tolerance(),
            target_rank: 0,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, MeshAdaptError> {
        let config: RunConfig =
            serde_yaml::from_str(text).map_err(|e| MeshAdaptError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MeshAdaptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MeshAdaptError::io(path, e))?;
        Self::from_yaml_str(&text)
    }

    /// Reject values no run can use.
    pub fn validate(&self) -> Result<(), MeshAdaptError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(MeshAdaptError::Config(format!(
                    "{name} must be positive, got {v}"
                )))
            }
        };
        positive("imbalance_tolerance", self.imbalance_tolerance)?;
        positive("merge_tolerance", self.merge_tolerance)?;
        if let Some(h) = self.hmin {
            positive("hmin", h)?;
        }
        if let Some(h) = self.hmax {
            positive("hmax", h)?;
        }
        if let (Some(lo), Some(hi)) = (self.hmin, self.hmax) {
            if lo >= hi {
                return Err(MeshAdaptError::Config(format!(
                    "hmin ({lo}) must be smaller than hmax ({hi})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = RunConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.input_mesh, PathBuf::from("m.mesh"));
        assert_eq!(cfg.output_solution, PathBuf::from("out.sol"));
        assert_eq!(cfg.verbosity, 5);
    }

    #[test]
    fn partial_document_overrides() {
        let cfg = RunConfig::from_yaml_str("optimize: true\nhmax: 0.5\nverbosity: 1\n").unwrap();
        assert!(cfg.optimize);
        assert_eq!(cfg.hmax, Some(0.5));
        assert_eq!(cfg.hmin, None);
        assert_eq!(cfg.verbosity, 1);
        assert_eq!(cfg.rebalance, Rebalance::Auto);
    }

    #[test]
    fn rebalance_policy_is_lowercase() {
        let cfg = RunConfig::from_yaml_str("rebalance: always\n").unwrap();
        assert_eq!(cfg.rebalance, Rebalance::Always);
        assert!(RunConfig::from_yaml_str("rebalance: Sometimes\n").is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            RunConfig::from_yaml_str("verbose: 3\n"),
            Err(MeshAdaptError::Config(_))
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(RunConfig::from_yaml_str("merge_tolerance: 0.0\n").is_err());
        assert!(RunConfig::from_yaml_str("imbalance_tolerance: -1.0\n").is_err());
        assert!(RunConfig::from_yaml_str("hmin: 0.5\nhmax: 0.1\n").is_err());
    }
}
