//! Mesh distribution: broadcast, partition, extraction and rebalancing.
//!
//! Distribution follows a *replicate then extract* scheme: the root's mesh is
//! broadcast to every rank, every rank computes the same deterministic
//! partition, and each keeps only its own elements. Vertices used by elements
//! of several parts are tagged on each holder with the other parts that use
//! them; those tags are what the merge later reconciles.

use crate::algs::collective::{all_gather_bytes, broadcast_bytes, gather_bytes};
use crate::algs::communicator::Communicator;
use crate::algs::merge::merge_fragments;
use crate::algs::partition::{PartitionMap, partition_elements};
use crate::algs::wire::{decode_fragment, encode_fragment};
use crate::data::fragment::MeshFragment;
use crate::mesh_error::MeshAdaptError;
use crate::run::config::Rebalance;
use crate::run::context::{ROOT, RunContext};
use crate::topology::point::PointId;
use std::collections::{BTreeMap, BTreeSet};

/// For every vertex, the set of parts whose elements use it.
pub fn vertex_parts(
    global: &MeshFragment,
    parts: &PartitionMap,
) -> Result<BTreeMap<PointId, BTreeSet<usize>>, MeshAdaptError> {
    let mut out: BTreeMap<PointId, BTreeSet<usize>> = BTreeMap::new();
    for (id, t) in &global.tetrahedra {
        let part = *parts
            .get(id)
            .ok_or_else(|| MeshAdaptError::Partition(format!("element {id} has no part")))?;
        for &v in &t.vertices {
            out.entry(v).or_default().insert(part);
        }
    }
    Ok(out)
}

/// Fragment of `global` owned by `rank` under `parts`.
///
/// Vertex and element ids are kept; the solution is restricted to the kept
/// vertices and the scaling state is copied.
pub fn extract_fragment(
    global: &MeshFragment,
    parts: &PartitionMap,
    rank: usize,
) -> Result<MeshFragment, MeshAdaptError> {
    let users = vertex_parts(global, parts)?;
    let mut local = MeshFragment::new();
    for (&id, t) in &global.tetrahedra {
        if parts.get(&id) == Some(&rank) {
            local.insert_tetra(id, *t);
        }
    }
    for (&v, ranks) in &users {
        if !ranks.contains(&rank) {
            continue;
        }
        let vertex = global
            .vertices
            .get(&v)
            .ok_or_else(|| MeshAdaptError::InvalidInput(format!("vertex {v} is missing")))?;
        local.insert_vertex(v, *vertex);
        let others: BTreeSet<usize> = ranks.iter().copied().filter(|&r| r != rank).collect();
        if !others.is_empty() {
            local.interface.insert(v, others);
        }
    }
    local.solution = global
        .solution
        .as_ref()
        .map(|s| s.restricted(local.vertices.keys()));
    local.set_scaling(global.scaling());
    Ok(local)
}

/// Replace every rank's fragment with the root's.
///
/// An encoding failure on the root is reported on every rank.
pub fn broadcast_fragment<C: Communicator>(
    comm: &C,
    root: usize,
    fragment: &mut MeshFragment,
) -> Result<(), MeshAdaptError> {
    let local = if comm.rank() == root {
        encode_fragment(fragment).map_err(|e| e.to_string())
    } else {
        Ok(Vec::new())
    };
    let bytes = broadcast_bytes(comm, root, local)?;
    if comm.rank() != root {
        *fragment = decode_fragment(&bytes)?;
    }
    Ok(())
}

/// Broadcast the root's mesh, partition it over all ranks and keep the local
/// part.
pub fn distribute<C: Communicator>(
    comm: &C,
    ctx: &RunContext,
    fragment: &mut MeshFragment,
) -> Result<(), MeshAdaptError> {
    broadcast_fragment(comm, ROOT, fragment)?;
    let parts = partition_elements(fragment, comm.size())?;
    *fragment = extract_fragment(fragment, &parts, comm.rank())?;
    if ctx.verbosity > 2 {
        log::debug!(
            "rank {}: {} elements, {} vertices, {} shared",
            comm.rank(),
            fragment.n_elements(),
            fragment.n_vertices(),
            fragment.interface.len()
        );
    }
    Ok(())
}

/// `max / mean` of per-rank element counts; `1.0` for a perfectly balanced or
/// empty distribution.
pub fn imbalance(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if counts.is_empty() || total == 0 {
        return 1.0;
    }
    let mean = total as f64 / counts.len() as f64;
    let max = counts.iter().copied().max().unwrap_or(0) as f64;
    max / mean
}

/// True when no rank holds more than `ceil(total / P)` elements, or when
/// `max / mean` stays within `1 + tolerance`.
///
/// The first test keeps small meshes, where one extra element already breaks
/// the ratio, from being repartitioned into the same partition.
pub fn is_balanced(counts: &[usize], tolerance: f64) -> bool {
    let total: usize = counts.iter().sum();
    let max = counts.iter().copied().max().unwrap_or(0);
    max <= total.div_ceil(counts.len().max(1)) || imbalance(counts) <= 1.0 + tolerance
}

fn element_counts<C: Communicator>(
    comm: &C,
    fragment: &MeshFragment,
) -> Result<Vec<usize>, MeshAdaptError> {
    let all = all_gather_bytes(comm, Ok((fragment.n_elements() as u64).to_le_bytes().to_vec()))?;
    all.iter()
        .map(|b| {
            let raw: [u8; 8] = b
                .as_slice()
                .try_into()
                .map_err(|_| MeshAdaptError::Wire("element count must be 8 bytes".into()))?;
            Ok(u64::from_le_bytes(raw) as usize)
        })
        .collect()
}

/// Rebalance fragments when the element counts are out of balance (see
/// [`is_balanced`]), or unconditionally under [`Rebalance::Always`].
///
/// Returns `Ok(None)` when the distribution is kept. Otherwise the
/// fragments are reassembled on the root, re-partitioned and the new local
/// fragment is returned; the caller decides whether to commit it. The input
/// fragment is never modified.
pub fn redistribute<C: Communicator>(
    comm: &C,
    ctx: &RunContext,
    fragment: &MeshFragment,
) -> Result<Option<MeshFragment>, MeshAdaptError> {
    if ctx.config.rebalance == Rebalance::Never {
        return Ok(None);
    }
    let counts = element_counts(comm, fragment)?;
    let ratio = imbalance(&counts);
    if ctx.config.rebalance == Rebalance::Auto
        && is_balanced(&counts, ctx.config.imbalance_tolerance)
    {
        log::debug!("element imbalance {ratio:.3} within tolerance, keeping partition");
        return Ok(None);
    }
    if ctx.verbosity > 0 {
        log::info!("element imbalance {ratio:.3} over {counts:?}, repartitioning");
    }

    let encoded = encode_fragment(fragment).map_err(|e| e.to_string());
    let gathered = gather_bytes(comm, ROOT, encoded)?;
    let assembled = match gathered {
        Some(items) => reassemble(items, ctx.config.merge_tolerance),
        None => Ok(Vec::new()),
    };
    let bytes = broadcast_bytes(comm, ROOT, assembled)?;
    let global = decode_fragment(&bytes)?;
    let parts = partition_elements(&global, comm.size())?;
    extract_fragment(&global, &parts, comm.rank()).map(Some)
}

fn reassemble(items: Vec<Result<Vec<u8>, String>>, tolerance: f64) -> Result<Vec<u8>, String> {
    let mut fragments = Vec::with_capacity(items.len());
    for (rank, item) in items.into_iter().enumerate() {
        let bytes = item.map_err(|msg| format!("rank {rank}: {msg}"))?;
        let fragment = decode_fragment(&bytes).map_err(|e| format!("rank {rank}: {e}"))?;
        fragments.push((rank, fragment));
    }
    let merged = merge_fragments(fragments, tolerance).map_err(|e| e.to_string())?;
    encode_fragment(&merged).map_err(|e| e.to_string())
}
