//! The run controller: executes the phase sequence on one process.
//!
//! Each phase runs locally, then every process agrees on its status (maximum
//! over the group) before [`transition`] picks what comes next, so all
//! processes always take the same branch and return the same outcome.

use crate::algs::collective::all_reduce_max_u8;
use crate::algs::communicator::Communicator;
use crate::algs::distribute::{distribute, redistribute};
use crate::algs::merge::merge_on_target;
use crate::data::fragment::MeshFragment;
use crate::geometry::scaling::unscale_fragment;
use crate::io::MeshStore;
use crate::mesh_error::MeshAdaptError;
use crate::remesh::{FrozenInterface, RemeshEngine, RemeshSeverity};
use crate::run::classify::{FailureKind, OutcomeAccumulator, Step, transition};
use crate::run::config::RunConfig;
use crate::run::context::{ROOT, RunContext};
use crate::run::phase::{Phase, PhaseStatus, RunOutcome};
use crate::run::preprocess::{PreprocessStatus, preprocess};
use crate::topology::adjacency::rebuild_boundary;
use crate::topology::analysis::AnalysisKernel;

/// What one process saw of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub rank: usize,
    pub outcome: RunOutcome,
    /// Agreed status of every phase that ran, in order.
    pub trace: Vec<(Phase, PhaseStatus)>,
    pub failures: Vec<FailureKind>,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }

    /// Whether `phase` ran at all.
    pub fn reached(&self, phase: Phase) -> bool {
        self.trace.iter().any(|(p, _)| *p == phase)
    }
}

/// Drives one process through a run.
pub struct RunController<'a, C, S, E, K> {
    comm: &'a C,
    config: RunConfig,
    store: S,
    engine: E,
    kernel: K,
    ctx: Option<RunContext>,
    fragment: MeshFragment,
    /// Rebalanced fragment awaiting group agreement.
    pending: Option<MeshFragment>,
}

impl<'a, C, S, E, K> RunController<'a, C, S, E, K>
where
    C: Communicator,
    S: MeshStore,
    E: RemeshEngine,
    K: AnalysisKernel,
{
    pub fn new(comm: &'a C, config: RunConfig, store: S, engine: E, kernel: K) -> Self {
        Self {
            comm,
            config,
            store,
            engine,
            kernel,
            ctx: None,
            fragment: MeshFragment::new(),
            pending: None,
        }
    }

    /// The local fragment; after a successful run the target holds the
    /// merged mesh and every other process an empty fragment.
    pub fn fragment(&self) -> &MeshFragment {
        &self.fragment
    }

    fn banners(&self) -> bool {
        match &self.ctx {
            Some(ctx) => ctx.banners(),
            None => self.comm.rank() == ROOT && self.config.verbosity >= 1,
        }
    }

    fn banner(&self, phase: Phase) -> String {
        if phase != Phase::Remesh {
            return phase.to_string();
        }
        let iso = self
            .fragment
            .solution
            .as_ref()
            .is_none_or(|s| s.is_isotropic());
        let kind = if iso { "ISOTROPIC" } else { "ANISOTROPIC" };
        format!("{phase} ({kind})")
    }

    /// Run every phase and report the agreed outcome.
    pub fn run(&mut self) -> RunReport {
        let mut acc = OutcomeAccumulator::default();
        let mut trace = Vec::with_capacity(Phase::ALL.len());
        let mut phase = Phase::Initialize;
        let outcome = loop {
            if self.banners() {
                log::info!("  -- {}", self.banner(phase));
            }
            let local = self.execute(phase);
            let agreed = match all_reduce_max_u8(self.comm, local.code()) {
                Ok(code) => PhaseStatus::from_code(code),
                Err(e) => {
                    log::error!("rank {}: could not agree on {phase}: {e}", self.comm.rank());
                    PhaseStatus::Fatal
                }
            };
            self.commit(phase, agreed);
            trace.push((phase, agreed));
            if agreed.is_ok() {
                if self.banners() {
                    log::info!("  -- PHASE {} COMPLETED.", phase.number());
                }
            } else if self.banners() {
                log::warn!("  ## {phase} FAILED ({agreed:?})");
            }
            match transition(phase, agreed, &mut acc) {
                Step::Continue(next) => phase = next,
                Step::Finish(outcome) => break outcome,
            }
        };
        if self.banners() {
            log::info!("  -- RUN FINISHED: {outcome}");
        }
        RunReport {
            rank: self.comm.rank(),
            outcome,
            trace,
            failures: acc.failures,
        }
    }

    fn commit(&mut self, phase: Phase, agreed: PhaseStatus) {
        if phase == Phase::Redistribute {
            let pending = self.pending.take();
            if let (PhaseStatus::Ok, Some(fragment)) = (agreed, pending) {
                self.fragment = fragment;
            }
        }
    }

    fn execute(&mut self, phase: Phase) -> PhaseStatus {
        if phase == Phase::Initialize {
            return self.initialize();
        }
        let Some(ctx) = self.ctx.clone() else {
            log::error!("rank {}: {phase} without a run context", self.comm.rank());
            return PhaseStatus::Fatal;
        };
        let status = match phase {
            Phase::Initialize => Ok(PhaseStatus::Ok),
            Phase::Load => self.load(&ctx),
            Phase::Validate => self.validate(&ctx),
            Phase::Distribute => distribute(self.comm, &ctx, &mut self.fragment)
                .map(|()| PhaseStatus::Ok)
                .map_err(|e| (PhaseStatus::Fatal, e.to_string())),
            Phase::Preprocess => {
                let status = preprocess(self.comm, &ctx, &mut self.fragment, &mut self.kernel);
                match &status {
                    PreprocessStatus::Done => Ok(PhaseStatus::Ok),
                    PreprocessStatus::FailedBeforeScaling(e)
                    | PreprocessStatus::FailedAfterScaling(e) => {
                        Err((status.phase_status(), e.to_string()))
                    }
                }
            }
            Phase::Redistribute => self.redistribute(&ctx),
            Phase::Remesh => self.remesh(&ctx),
            Phase::Unscale => unscale_fragment(&mut self.fragment)
                .map(|()| PhaseStatus::Ok)
                .map_err(|e| (PhaseStatus::Fatal, e.to_string())),
            Phase::Merge => {
                merge_on_target(self.comm, &ctx, &mut self.fragment, ctx.config.target_rank)
                    .map(|()| PhaseStatus::Ok)
                    .map_err(|e| (PhaseStatus::Fatal, e.to_string()))
            }
            Phase::Finalize => self.finalize(&ctx),
        };
        match status {
            Ok(s) => s,
            Err((s, message)) => {
                log::error!("rank {}: {}: {message}", ctx.rank, phase.name());
                s
            }
        }
    }

    fn initialize(&mut self) -> PhaseStatus {
        match RunContext::new(self.config.clone(), self.comm.rank(), self.comm.size()) {
            Ok(ctx) => {
                log::debug!(
                    "rank {} of {}: verbosity {}",
                    ctx.rank,
                    ctx.size,
                    ctx.verbosity
                );
                self.ctx = Some(ctx);
                PhaseStatus::Ok
            }
            Err(e) => {
                log::error!("rank {}: initialization failed: {e}", self.comm.rank());
                PhaseStatus::Fatal
            }
        }
    }

    fn load(&mut self, ctx: &RunContext) -> Result<PhaseStatus, (PhaseStatus, String)> {
        if !ctx.is_root() {
            return Ok(PhaseStatus::Ok);
        }
        let fatal = |e: MeshAdaptError| (PhaseStatus::Fatal, e.to_string());
        let mut fragment = self.store.load_mesh(&ctx.config.input_mesh).map_err(fatal)?;
        let found = self
            .store
            .load_solution(&ctx.config.input_solution, &mut fragment)
            .map_err(fatal)?;
        if ctx.verbosity > 0 {
            log::info!(
                "  %% {}: {} vertices, {} elements",
                ctx.config.input_mesh.display(),
                fragment.n_vertices(),
                fragment.n_elements()
            );
            if !found {
                log::info!(
                    "  %% {} not found, continuing without a solution",
                    ctx.config.input_solution.display()
                );
            }
        }
        self.fragment = fragment;
        Ok(PhaseStatus::Ok)
    }

    fn validate(&self, ctx: &RunContext) -> Result<PhaseStatus, (PhaseStatus, String)> {
        let f = &self.fragment;
        let fatal = |message: String| (PhaseStatus::Fatal, message);
        if !ctx.is_root() {
            if !f.is_empty() {
                return Err(fatal("non-root process holds mesh data before distribution".into()));
            }
            return Ok(PhaseStatus::Ok);
        }
        if f.vertices.is_empty() || f.tetrahedra.is_empty() {
            return Err(fatal(format!(
                "input needs vertices and elements, found {} and {}",
                f.n_vertices(),
                f.n_elements()
            )));
        }
        if f.scaling().is_scaled() {
            return Err(fatal("input mesh is already scaled".into()));
        }
        f.check_connectivity().map_err(|e| fatal(e.to_string()))?;
        // Distribution only hands out vertices through their elements.
        f.check_vertex_use().map_err(|e| fatal(e.to_string()))?;
        f.check_solution().map_err(|e| fatal(e.to_string()))?;
        Ok(PhaseStatus::Ok)
    }

    fn redistribute(&mut self, ctx: &RunContext) -> Result<PhaseStatus, (PhaseStatus, String)> {
        let recoverable = |message: String| (PhaseStatus::Recoverable, message);
        let Some(mut candidate) =
            redistribute(self.comm, ctx, &self.fragment).map_err(|e| recoverable(e.to_string()))?
        else {
            return Ok(PhaseStatus::Ok);
        };
        let analysis = self
            .kernel
            .analyse(&candidate, ctx)
            .map_err(|e| recoverable(e.to_string()))?;
        candidate.analysis = Some(analysis);
        self.pending = Some(candidate);
        Ok(PhaseStatus::Ok)
    }

    fn remesh(&mut self, ctx: &RunContext) -> Result<PhaseStatus, (PhaseStatus, String)> {
        let frozen = FrozenInterface::capture(&self.fragment);
        let checked = self
            .engine
            .adapt(&mut self.fragment, ctx)
            .and_then(|()| frozen.verify(&self.fragment));
        if let Err(e) = checked {
            let status = match e.severity {
                RemeshSeverity::Recoverable => PhaseStatus::Recoverable,
                RemeshSeverity::Fatal => PhaseStatus::Fatal,
            };
            return Err((status, e.to_string()));
        }
        self.fragment
            .check_connectivity()
            .map_err(|e| (PhaseStatus::Fatal, format!("non-conformal fragment: {e}")))?;
        Ok(PhaseStatus::Ok)
    }

    fn finalize(&mut self, ctx: &RunContext) -> Result<PhaseStatus, (PhaseStatus, String)> {
        if !ctx.is_target() {
            return Ok(PhaseStatus::Ok);
        }
        let fatal = |e: MeshAdaptError| (PhaseStatus::Fatal, e.to_string());
        let n_boundary = rebuild_boundary(&mut self.fragment).map_err(fatal)?;
        self.store
            .save_mesh(&ctx.config.output_mesh, &self.fragment)
            .map_err(fatal)?;
        if ctx.verbosity > 0 {
            log::info!(
                "  %% {} written: {} vertices, {} elements, {n_boundary} boundary triangles",
                ctx.config.output_mesh.display(),
                self.fragment.n_vertices(),
                self.fragment.n_elements()
            );
        }
        if self.fragment.solution.is_some() {
            self.store
                .save_solution(&ctx.config.output_solution, &self.fragment)
                .map_err(|e| (PhaseStatus::Recoverable, e.to_string()))?;
        }
        Ok(PhaseStatus::Ok)
    }
}
