mod util;
use util::*;

use mesh_adapt_run::algs::meshgen::{box_mesh, uniform_size_field};
use mesh_adapt_run::algs::partition::part_targets;
use mesh_adapt_run::data::fragment::{MeshFragment, Vertex};
use mesh_adapt_run::io::MemoryStore;
use mesh_adapt_run::mesh_error::MeshAdaptError;
use mesh_adapt_run::remesh::{IdentityRemesher, RemeshEngine, RemeshError};
use mesh_adapt_run::run::{
    FailureKind, Phase, PhaseStatus, Rebalance, RunConfig, RunContext, RunController, RunOutcome,
    RunReport,
};
use mesh_adapt_run::topology::analysis::{AnalysisKernel, MeshAnalysis, TopologyAnalysis};
use mesh_adapt_run::topology::point::PointId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn run_world<E, K>(n: usize, config: RunConfig, store: MemoryStore, engine: E, kernel: K) -> Vec<RunReport>
where
    E: RemeshEngine + Clone + Send + Sync + 'static,
    K: AnalysisKernel + Clone + Send + Sync + 'static,
{
    on_world(n, move |comm| {
        RunController::new(
            &comm,
            config.clone(),
            store.clone(),
            engine.clone(),
            kernel.clone(),
        )
        .run()
    })
}

fn assert_agreed(reports: &[RunReport], outcome: RunOutcome) {
    for r in reports {
        assert_eq!(r.outcome, outcome, "rank {}", r.rank);
        assert_eq!(r.trace, reports[0].trace, "rank {} diverged", r.rank);
    }
}

/// Fails the structural analysis on one rank.
#[derive(Clone)]
struct AnalysisFailsOn(usize);

impl AnalysisKernel for AnalysisFailsOn {
    fn analyse(
        &mut self,
        fragment: &MeshFragment,
        ctx: &RunContext,
    ) -> Result<MeshAnalysis, MeshAdaptError> {
        if ctx.rank == self.0 {
            return Err(MeshAdaptError::InvalidInput("analysis refused".into()));
        }
        TopologyAnalysis.analyse(fragment, ctx)
    }
}

/// Corrupts one vertex on one rank, then reports a recoverable failure.
#[derive(Clone)]
struct CorruptsOn(usize);

impl RemeshEngine for CorruptsOn {
    fn adapt(&mut self, fragment: &mut MeshFragment, ctx: &RunContext) -> Result<(), RemeshError> {
        if ctx.rank != self.0 {
            return Ok(());
        }
        if let Some(v) = fragment.vertices.values_mut().next() {
            v.coords[1] = f64::NAN;
        }
        Err(RemeshError::recoverable("gave up mid-way"))
    }
}

/// Changes the size value of every interface vertex on one rank.
#[derive(Clone)]
struct SkewsInterfaceOn(usize);

impl RemeshEngine for SkewsInterfaceOn {
    fn adapt(&mut self, fragment: &mut MeshFragment, ctx: &RunContext) -> Result<(), RemeshError> {
        if ctx.rank != self.0 {
            return Ok(());
        }
        let shared: Vec<_> = fragment.interface.keys().copied().collect();
        let sol = fragment.solution.as_mut().unwrap();
        for v in shared {
            sol.get_mut(v).unwrap()[0] *= 2.0;
        }
        Ok(())
    }
}

#[test]
fn four_ranks_reproduce_the_input() {
    let store = box_store([4, 4, 4], [2.0, 1.0, 1.0], 0.125);
    let reports = run_world(4, RunConfig::default(), store.clone(), IdentityRemesher, TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::Success);
    assert_eq!(reports[0].trace.len(), Phase::ALL.len());
    assert!(reports[0].trace.iter().all(|(_, s)| s.is_ok()));

    let input = box_mesh([4, 4, 4], [2.0, 1.0, 1.0]).unwrap();
    let out = store.mesh("out.mesh").unwrap();
    assert_eq!(out.n_elements(), input.n_elements());
    assert_eq!(out.n_vertices(), input.n_vertices());
    assert!(!out.scaling().is_scaled());
    assert_coords_close(&sorted_coords(&out), &sorted_coords(&input), 1e-9);
    // Six faces of 4 x 4 squares, two triangles each.
    assert_eq!(out.boundary.len(), 6 * 16 * 2);

    let sol = store.solution("out.sol").unwrap();
    assert_eq!(sol.len(), out.n_vertices());
    assert!(sol.iter().all(|(_, h)| (h[0] - 0.125).abs() < 1e-12));
    // Ids are renumbered densely.
    assert_eq!(out.vertices.keys().last().unwrap().get(), out.n_vertices() as u64);
}

#[test]
fn load_failure_is_strong_and_writes_nothing() {
    let store = MemoryStore::new();
    let reports = run_world(4, RunConfig::default(), store.clone(), IdentityRemesher, TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::StrongFailure);
    assert_eq!(
        reports[0].trace,
        vec![(Phase::Initialize, PhaseStatus::Ok), (Phase::Load, PhaseStatus::Fatal)]
    );
    assert!(store.written_paths().is_empty());
}

/// Gives up without touching the fragment on one rank.
#[derive(Clone)]
struct GivesUpOn(usize);

impl RemeshEngine for GivesUpOn {
    fn adapt(&mut self, _: &mut MeshFragment, ctx: &RunContext) -> Result<(), RemeshError> {
        if ctx.rank == self.0 {
            return Err(RemeshError::recoverable("no progress"));
        }
        Ok(())
    }
}

#[test]
fn remesh_failure_on_one_rank_degrades_every_rank() {
    let store = box_store([4, 2, 2], [1.0; 3], 0.25);
    let reports = run_world(4, RunConfig::default(), store.clone(), GivesUpOn(3), TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::LowFailure);
    assert!(reports.iter().all(|r| r.exit_code() == 1));
    assert!(reports[0].trace.contains(&(Phase::Remesh, PhaseStatus::Recoverable)));
    assert!(reports[0].trace.contains(&(Phase::Unscale, PhaseStatus::Ok)));
    assert!(store.mesh("out.mesh").is_some());
    assert!(store.solution("out.sol").is_some());
}

#[test]
fn failure_after_scaling_still_writes_physical_mesh() {
    let store = box_store([4, 2, 2], [1.0; 3], 0.25);
    let reports = run_world(4, RunConfig::default(), store.clone(), IdentityRemesher, AnalysisFailsOn(2));
    assert_agreed(&reports, RunOutcome::LowFailure);
    assert!(!reports[0].reached(Phase::Remesh));
    assert!(reports[0].reached(Phase::Unscale));
    assert_eq!(reports[1].failures, vec![FailureKind::PostScaleRecoverable]);

    let input = box_mesh([4, 2, 2], [1.0; 3]).unwrap();
    let out = store.mesh("out.mesh").unwrap();
    assert_coords_close(&sorted_coords(&out), &sorted_coords(&input), 1e-9);
}

#[test]
fn corrupted_geometry_cannot_be_unscaled() {
    let store = box_store([4, 4, 2], [1.0; 3], 0.25);
    let reports = run_world(4, RunConfig::default(), store.clone(), CorruptsOn(1), TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::StrongFailure);
    let last = *reports[0].trace.last().unwrap();
    assert_eq!(last, (Phase::Unscale, PhaseStatus::Fatal));
    assert!(store.written_paths().is_empty());
}

#[test]
fn inconsistent_shared_values_fail_the_merge() {
    let store = box_store([4, 2, 2], [1.0; 3], 0.25);
    let reports = run_world(4, RunConfig::default(), store.clone(), SkewsInterfaceOn(1), TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::StrongFailure);
    assert_eq!(*reports[0].trace.last().unwrap(), (Phase::Merge, PhaseStatus::Fatal));
    assert_eq!(reports[0].failures, vec![FailureKind::Merge]);
    assert!(store.written_paths().is_empty());
}

#[test]
fn output_goes_to_the_target_rank() {
    let store = box_store([2, 2, 2], [1.0; 3], 0.5);
    let cfg = RunConfig {
        target_rank: 2,
        ..RunConfig::default()
    };
    let reports = on_world(3, move |comm| {
        let mut ctl = RunController::new(
            &comm,
            cfg.clone(),
            store.clone(),
            IdentityRemesher,
            TopologyAnalysis,
        );
        let report = ctl.run();
        (report, ctl.fragment().n_elements())
    });
    for (rank, (report, n)) in reports.iter().enumerate() {
        assert_eq!(report.outcome, RunOutcome::Success);
        let want = if rank == 2 { 48 } else { 0 };
        assert_eq!(*n, want, "rank {rank}");
    }
}

#[test]
fn optimize_without_solution_writes_a_size_field() {
    let store = MemoryStore::new();
    store.insert_mesh("m.mesh", box_mesh([4, 2, 2], [2.0, 1.0, 1.0]).unwrap());
    let cfg = RunConfig {
        optimize: true,
        ..RunConfig::default()
    };
    let reports = run_world(2, cfg, store.clone(), IdentityRemesher, TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::Success);
    let out = store.mesh("out.mesh").unwrap();
    let sol = store.solution("out.sol").unwrap();
    assert_eq!(sol.len(), out.n_vertices());
    assert!(sol.iter().all(|(_, h)| h[0] > 0.0 && h[0].is_finite()));
}

#[test]
fn unused_input_vertex_is_rejected() {
    let store = box_store([2, 2, 2], [1.0; 3], 0.5);
    let mut mesh = store.mesh("m.mesh").unwrap();
    mesh.insert_vertex(pid(1000), Vertex::new([5.0, 5.0, 5.0]));
    store.insert_mesh("m.mesh", mesh);
    let mut sol = store.solution("m.sol").unwrap();
    sol.set(pid(1000), &[0.5]).unwrap();
    store.insert_solution("m.sol", sol);

    let reports = run_world(2, RunConfig::default(), store.clone(), IdentityRemesher, TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::StrongFailure);
    assert_eq!(
        reports[0].trace,
        vec![
            (Phase::Initialize, PhaseStatus::Ok),
            (Phase::Load, PhaseStatus::Ok),
            (Phase::Validate, PhaseStatus::Fatal),
        ]
    );
    assert!(store.written_paths().is_empty());
}

/// A 2 x 1 x 1 box (12 elements) whose element ids are spaced by ten, so a
/// fragment cut from the reassembled mesh is told apart by its dense ids.
fn sparse_box_store() -> MemoryStore {
    let mut mesh = box_mesh([2, 1, 1], [2.0, 1.0, 1.0]).unwrap();
    mesh.tetrahedra = std::mem::take(&mut mesh.tetrahedra)
        .into_iter()
        .map(|(id, t)| (pid(10 * id.get()), t))
        .collect();
    let store = MemoryStore::new();
    store.insert_solution("m.sol", uniform_size_field(&mesh, 0.5).unwrap());
    store.insert_mesh("m.mesh", mesh);
    store
}

/// Records, per rank, the element ids handed to the engine.
#[derive(Clone, Default)]
struct RecordsElements(Arc<Mutex<BTreeMap<usize, Vec<PointId>>>>);

impl RemeshEngine for RecordsElements {
    fn adapt(&mut self, fragment: &mut MeshFragment, ctx: &RunContext) -> Result<(), RemeshError> {
        let ids = fragment.tetrahedra.keys().copied().collect();
        self.0.lock().insert(ctx.rank, ids);
        Ok(())
    }
}

/// Refuses the second analysis on one rank: the repartitioned fragment.
#[derive(Clone)]
struct SecondAnalysisFailsOn {
    rank: usize,
    calls: usize,
}

impl AnalysisKernel for SecondAnalysisFailsOn {
    fn analyse(
        &mut self,
        fragment: &MeshFragment,
        ctx: &RunContext,
    ) -> Result<MeshAnalysis, MeshAdaptError> {
        self.calls += 1;
        if ctx.rank == self.rank && self.calls == 2 {
            return Err(MeshAdaptError::InvalidInput("new fragment refused".into()));
        }
        TopologyAnalysis.analyse(fragment, ctx)
    }
}

fn always_rebalance() -> RunConfig {
    RunConfig {
        rebalance: Rebalance::Always,
        ..RunConfig::default()
    }
}

#[test]
fn rebalanced_fragments_reach_the_engine() {
    let store = sparse_box_store();
    let engine = RecordsElements::default();
    let reports = run_world(5, always_rebalance(), store.clone(), engine.clone(), TopologyAnalysis);
    assert_agreed(&reports, RunOutcome::Success);
    assert!(reports[0].trace.contains(&(Phase::Redistribute, PhaseStatus::Ok)));

    let adapted = engine.0.lock().clone();
    let sizes: Vec<usize> = adapted.values().map(Vec::len).collect();
    assert_eq!(sizes, part_targets(12, 5));
    // The reassembled mesh was renumbered, so the committed fragments no
    // longer carry the input's spaced ids.
    let ids: BTreeSet<PointId> = adapted.values().flatten().copied().collect();
    assert_eq!(ids, (1..=12).map(pid).collect());

    let out = store.mesh("out.mesh").unwrap();
    assert_eq!(out.n_elements(), 12);
    assert_eq!(out.n_vertices(), 12);
}

#[test]
fn failed_rebalance_keeps_the_old_fragments() {
    let store = sparse_box_store();
    let engine = RecordsElements::default();
    let kernel = SecondAnalysisFailsOn { rank: 1, calls: 0 };
    let reports = run_world(5, always_rebalance(), store.clone(), engine.clone(), kernel);
    assert_agreed(&reports, RunOutcome::LowFailure);
    assert_eq!(
        reports[0].trace[Phase::Redistribute.number() - 1..],
        [
            (Phase::Redistribute, PhaseStatus::Recoverable),
            (Phase::Unscale, PhaseStatus::Ok),
            (Phase::Merge, PhaseStatus::Ok),
            (Phase::Finalize, PhaseStatus::Ok),
        ]
    );
    assert_eq!(reports[3].failures, vec![FailureKind::PostScaleRecoverable]);
    assert!(engine.0.lock().is_empty());

    let input = box_mesh([2, 1, 1], [2.0, 1.0, 1.0]).unwrap();
    let out = store.mesh("out.mesh").unwrap();
    assert_eq!(out.n_elements(), 12);
    assert_coords_close(&sorted_coords(&out), &sorted_coords(&input), 1e-9);
    assert_eq!(store.solution("out.sol").unwrap().len(), 12);
}
