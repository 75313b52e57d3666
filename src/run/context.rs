//! Per-process run context, passed explicitly to every phase.

use crate::mesh_error::MeshAdaptError;
use crate::run::config::RunConfig;

/// Rank that loads the input mesh.
pub const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub rank: usize,
    pub size: usize,
    /// Effective verbosity: the configured level on the root, 0 elsewhere.
    pub verbosity: u8,
    pub config: RunConfig,
}

impl RunContext {
    pub fn new(config: RunConfig, rank: usize, size: usize) -> Result<Self, MeshAdaptError> {
        if size == 0 {
            return Err(MeshAdaptError::Config(
                "a run needs at least one process".into(),
            ));
        }
        if rank >= size {
            return Err(MeshAdaptError::Config(format!(
                "rank {rank} is outside a group of {size} processes"
            )));
        }
        if config.target_rank >= size {
            return Err(MeshAdaptError::Config(format!(
                "target rank {} is outside a group of {size} processes",
                config.target_rank
            )));
        }
        config.validate()?;
        let verbosity = if rank == ROOT { config.verbosity } else { 0 };
        Ok(Self {
            rank,
            size,
            verbosity,
            config,
        })
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.rank == ROOT
    }

    #[inline]
    pub fn is_target(&self) -> bool {
        self.rank == self.config.target_rank
    }

    /// Whether phase banners are printed on this process.
    #[inline]
    pub fn banners(&self) -> bool {
        self.verbosity >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_root_is_chatty() {
        let root = RunContext::new(RunConfig::default(), 0, 4).unwrap();
        let other = RunContext::new(RunConfig::default(), 3, 4).unwrap();
        assert_eq!(root.verbosity, 5);
        assert!(root.banners());
        assert_eq!(other.verbosity, 0);
        assert!(!other.banners());
    }

    #[test]
    fn group_must_contain_rank_and_target() {
        assert!(RunContext::new(RunConfig::default(), 0, 0).is_err());
        assert!(RunContext::new(RunConfig::default(), 2, 2).is_err());
        let cfg = RunConfig {
            target_rank: 4,
            ..RunConfig::default()
        };
        assert!(RunContext::new(cfg, 0, 4).is_err());
    }
}
