//! Preprocessing of the local fragment before adaptation.
//!
//! Steps, each depending on the previous one:
//! 1. global bounding box and scaling into the unit frame,
//! 2. element quality histogram (diagnostic only),
//! 3. default size field when `optimize` is set and no solution was given,
//! 4. structural analysis,
//! 5. edge-length histogram at high verbosity (diagnostic only).
//!
//! Every rank performs the same collectives in the same order whatever its
//! local outcome, so a failure on one rank never leaves the others waiting.

use crate::algs::collective::{all_gather_bytes, all_reduce_max_u8, gather_bytes};
use crate::algs::communicator::Communicator;
use crate::algs::wire::{
    decode_box, decode_edge_sums, decode_quality, encode_box, encode_edge_sums, encode_quality,
};
use crate::data::fragment::MeshFragment;
use crate::data::solution::SolutionField;
use crate::geometry::quality::{QualityHistogram, length_histogram, quality_histogram};
use crate::geometry::scaling::{BoundingBox, ScalingFrame, scale_fragment};
use crate::mesh_error::MeshAdaptError;
use crate::run::context::{ROOT, RunContext};
use crate::run::phase::PhaseStatus;
use crate::topology::adjacency::unique_edges;
use crate::topology::analysis::AnalysisKernel;
use crate::topology::point::PointId;
use std::collections::BTreeMap;

/// Default smallest size in the unit frame when `hmin` is not configured.
pub const DEFAULT_HMIN: f64 = 0.01;
/// Default largest size in the unit frame when `hmax` is not configured.
pub const DEFAULT_HMAX: f64 = 1.0;

/// Local result of preprocessing.
#[derive(Debug)]
pub enum PreprocessStatus {
    Done,
    /// The fragment was never scaled.
    FailedBeforeScaling(MeshAdaptError),
    /// The fragment is scaled; it must be unscaled before anything else.
    FailedAfterScaling(MeshAdaptError),
}

impl PreprocessStatus {
    pub fn phase_status(&self) -> PhaseStatus {
        match self {
            PreprocessStatus::Done => PhaseStatus::Ok,
            PreprocessStatus::FailedAfterScaling(_) => PhaseStatus::Recoverable,
            PreprocessStatus::FailedBeforeScaling(_) => PhaseStatus::Fatal,
        }
    }
}

/// Frame of the bounding box of all fragments, identical on every rank.
pub fn global_frame<C: Communicator>(
    comm: &C,
    fragment: &MeshFragment,
) -> Result<ScalingFrame, MeshAdaptError> {
    let boxes = all_gather_bytes(comm, Ok(encode_box(&BoundingBox::of(fragment))))?;
    let mut global = BoundingBox::empty();
    for b in &boxes {
        global = global.union(&decode_box(b)?);
    }
    global.frame()
}

/// Combine the per-rank quality histograms on the root and log them there.
fn report_quality<C: Communicator>(comm: &C, ctx: &RunContext, local: &QualityHistogram) {
    match gather_bytes(comm, ROOT, Ok(encode_quality(local))) {
        Ok(Some(items)) if ctx.verbosity > 0 => {
            let combined = items
                .iter()
                .filter_map(|item| item.as_ref().ok())
                .filter_map(|bytes| decode_quality(bytes).ok())
                .fold(QualityHistogram::default(), QualityHistogram::combine);
            log::info!("{combined}");
        }
        Ok(_) => {}
        Err(e) => log::warn!("quality histogram unavailable: {e}"),
    }
}

/// Sum and count of incident edge lengths per vertex.
fn edge_sums(fragment: &MeshFragment) -> BTreeMap<PointId, (f64, u64)> {
    let mut sums: BTreeMap<PointId, (f64, u64)> = BTreeMap::new();
    for (a, b) in unique_edges(fragment) {
        let (Some(va), Some(vb)) = (fragment.vertices.get(&a), fragment.vertices.get(&b)) else {
            continue;
        };
        let d = (0..3)
            .map(|i| (vb.coords[i] - va.coords[i]).powi(2))
            .sum::<f64>()
            .sqrt();
        for v in [a, b] {
            let e = sums.entry(v).or_insert((0.0, 0));
            e.0 += d;
            e.1 += 1;
        }
    }
    sums
}

/// Isotropic size field: mean incident edge length at every vertex, clamped
/// to `[hmin, hmax]` (unit-frame values).
///
/// Interface vertices combine the sums of every holder in rank order, so all
/// copies of a shared vertex get the same size; an edge on a partition
/// interface counts once per holder.
pub fn default_size_field<C: Communicator>(
    comm: &C,
    fragment: &MeshFragment,
    hmin: f64,
    hmax: f64,
) -> Result<SolutionField, MeshAdaptError> {
    let mut sums = edge_sums(fragment);
    let shared: BTreeMap<PointId, (f64, u64)> = sums
        .iter()
        .filter(|(v, _)| fragment.is_shared(**v))
        .map(|(v, s)| (*v, *s))
        .collect();
    let all = all_gather_bytes(comm, Ok(encode_edge_sums(&shared)))?;
    let mut combined: BTreeMap<PointId, (f64, u64)> = BTreeMap::new();
    for bytes in &all {
        for (v, sum, count) in decode_edge_sums(bytes)? {
            if fragment.is_shared(v) {
                let e = combined.entry(v).or_insert((0.0, 0));
                e.0 += sum;
                e.1 += count;
            }
        }
    }
    sums.extend(combined);

    let mut sol = SolutionField::new(1)?;
    for &v in fragment.vertices.keys() {
        let h = match sums.get(&v) {
            Some(&(sum, count)) if count > 0 => sum / count as f64,
            _ => hmax,
        };
        sol.set(v, &[h])?;
    }
    sol.truncate(hmin, hmax);
    Ok(sol)
}

/// Size bounds of the run expressed in the unit frame.
fn size_bounds(ctx: &RunContext, frame: &ScalingFrame) -> (f64, f64) {
    let hmin = ctx.config.hmin.map_or(DEFAULT_HMIN, |h| h / frame.delta);
    let hmax = ctx.config.hmax.map_or(DEFAULT_HMAX, |h| h / frame.delta);
    (hmin, hmax.max(hmin))
}

/// Scale, diagnose and analyse the local fragment.
pub fn preprocess<C, K>(
    comm: &C,
    ctx: &RunContext,
    fragment: &mut MeshFragment,
    kernel: &mut K,
) -> PreprocessStatus
where
    C: Communicator,
    K: AnalysisKernel + ?Sized,
{
    let frame = match global_frame(comm, fragment) {
        Ok(frame) => frame,
        Err(e) => return PreprocessStatus::FailedBeforeScaling(e),
    };
    let scaled = scale_fragment(fragment, frame);
    let code = if scaled.is_ok() { 0 } else { 1 };
    let agreed = all_reduce_max_u8(comm, code);
    match (scaled, agreed) {
        (Err(e), _) => return PreprocessStatus::FailedBeforeScaling(e),
        (Ok(()), Err(e)) => return PreprocessStatus::FailedAfterScaling(e),
        (Ok(()), Ok(0)) => {}
        (Ok(()), Ok(_)) => {
            return PreprocessStatus::FailedAfterScaling(MeshAdaptError::InvalidGeometry(
                "scaling failed on another rank".into(),
            ));
        }
    }

    report_quality(comm, ctx, &quality_histogram(fragment));

    if ctx.config.optimize && fragment.solution.is_none() {
        let (hmin, hmax) = size_bounds(ctx, &frame);
        match default_size_field(comm, fragment, hmin, hmax) {
            Ok(sol) => {
                if ctx.verbosity > 1 {
                    log::info!("  -- DEFAULT SIZE FIELD   hmin {hmin:e}  hmax {hmax:e}");
                }
                fragment.solution = Some(sol);
            }
            Err(e) => return PreprocessStatus::FailedAfterScaling(e),
        }
    }

    match kernel.analyse(fragment, ctx) {
        Ok(analysis) => {
            log::debug!(
                "rank {}: {} edges, {} boundary faces, {} interface faces",
                ctx.rank,
                analysis.n_edges,
                analysis.n_boundary_faces,
                analysis.n_interface_faces
            );
            fragment.analysis = Some(analysis);
        }
        Err(e) => return PreprocessStatus::FailedAfterScaling(e),
    }

    if ctx.verbosity > 1 {
        if let Some(h) = length_histogram(fragment) {
            log::info!("{h}");
        }
    }
    PreprocessStatus::Done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::box_mesh;
    use crate::run::config::RunConfig;
    use crate::topology::analysis::TopologyAnalysis;

    fn ctx(config: RunConfig) -> RunContext {
        RunContext::new(config, 0, 1).unwrap()
    }

    #[test]
    fn preprocess_scales_and_analyses() {
        let mut f = box_mesh([2, 2, 2], [4.0, 2.0, 2.0]).unwrap();
        let status = preprocess(&NoComm, &ctx(RunConfig::default()), &mut f, &mut TopologyAnalysis);
        assert!(matches!(status, PreprocessStatus::Done));
        assert!(f.scaling().is_scaled());
        assert_eq!(f.scaling().frame().unwrap().delta, 4.0);
        assert!(f.analysis().is_some());
        assert!(f.solution.is_none());
    }

    #[test]
    fn optimize_synthesizes_a_clamped_field() {
        let cfg = RunConfig {
            optimize: true,
            hmin: Some(0.6),
            hmax: Some(1.2),
            ..RunConfig::default()
        };
        let mut f = box_mesh([2, 2, 2], [2.0, 2.0, 2.0]).unwrap();
        let status = preprocess(&NoComm, &ctx(cfg), &mut f, &mut TopologyAnalysis);
        assert!(matches!(status, PreprocessStatus::Done));
        let sol = f.solution.as_ref().unwrap();
        assert_eq!(sol.len(), f.n_vertices());
        // Unit frame: bounds are 0.3 and 0.6.
        for (_, h) in sol.iter() {
            assert!((0.3 - 1e-12..=0.6 + 1e-12).contains(&h[0]), "{h:?}");
        }
    }

    #[test]
    fn degenerate_box_fails_before_scaling() {
        let mut f = MeshFragment::new();
        let status = preprocess(&NoComm, &ctx(RunConfig::default()), &mut f, &mut TopologyAnalysis);
        assert!(matches!(status, PreprocessStatus::FailedBeforeScaling(_)));
        assert_eq!(status.phase_status(), PhaseStatus::Fatal);
        assert!(!f.scaling().is_scaled());
    }

    #[test]
    fn analysis_failure_happens_after_scaling() {
        let mut f = box_mesh([1, 1, 1], [1.0; 3]).unwrap();
        f.tetrahedra.values_mut().next().unwrap().vertices.swap(0, 1);
        let status = preprocess(&NoComm, &ctx(RunConfig::default()), &mut f, &mut TopologyAnalysis);
        assert!(matches!(status, PreprocessStatus::FailedAfterScaling(_)));
        assert_eq!(status.phase_status(), PhaseStatus::Recoverable);
        assert!(f.scaling().is_scaled());
    }
}
