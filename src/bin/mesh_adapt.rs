//! Command-line driver for one mesh adaptation run.
//!
//! Launch one process per rank; with the `mpi-support` feature the processes
//! form an MPI group, otherwise the run is sequential.

use clap::Parser;
use mesh_adapt_run::io::JsonMeshStore;
use mesh_adapt_run::remesh::IdentityRemesher;
use mesh_adapt_run::run::{RunConfig, RunController, RunOutcome};
use mesh_adapt_run::topology::analysis::TopologyAnalysis;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Distributed tetrahedral mesh adaptation.
#[derive(Parser, Debug)]
#[command(name = "mesh-adapt")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Distribute, adapt and merge a tetrahedral mesh", long_about = None)]
struct Cli {
    /// YAML run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input mesh (overrides the configuration).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Input solution (overrides the configuration).
    #[arg(short, long)]
    solution: Option<PathBuf>,

    /// Output mesh (overrides the configuration).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output solution (overrides the configuration).
    #[arg(long)]
    output_solution: Option<PathBuf>,

    /// Verbosity of the root process (overrides the configuration).
    #[arg(short, long)]
    verbose: Option<u8>,

    /// Synthesize a size field when no solution is given.
    #[arg(long)]
    optimize: bool,

    #[arg(long)]
    hmin: Option<f64>,

    #[arg(long)]
    hmax: Option<f64>,

    /// Pretty-print written JSON documents.
    #[arg(long)]
    pretty: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> Result<RunConfig, mesh_adapt_run::mesh_error::MeshAdaptError> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_path(path)?,
            None => RunConfig::default(),
        };
        if let Some(p) = &self.input {
            cfg.input_mesh = p.clone();
        }
        if let Some(p) = &self.solution {
            cfg.input_solution = p.clone();
        }
        if let Some(p) = &self.output {
            cfg.output_mesh = p.clone();
        }
        if let Some(p) = &self.output_solution {
            cfg.output_solution = p.clone();
        }
        if let Some(v) = self.verbose {
            cfg.verbosity = v;
        }
        cfg.optimize |= self.optimize;
        cfg.hmin = self.hmin.or(cfg.hmin);
        cfg.hmax = self.hmax.or(cfg.hmax);
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match cli.config() {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(RunOutcome::StrongFailure.exit_code());
        }
    };
    let store = JsonMeshStore { pretty: cli.pretty };

    #[cfg(feature = "mpi-support")]
    let comm = match mesh_adapt_run::algs::communicator::MpiComm::new() {
        Ok(comm) => comm,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::from(RunOutcome::StrongFailure.exit_code());
        }
    };
    #[cfg(not(feature = "mpi-support"))]
    let comm = mesh_adapt_run::algs::communicator::NoComm;

    let report =
        RunController::new(&comm, config, store, IdentityRemesher, TopologyAnalysis).run();
    ExitCode::from(report.exit_code())
}
