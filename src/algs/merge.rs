//! Reassembly of per-rank fragments into a single mesh.
//!
//! Shared vertices are matched by global id and owned by the lowest rank
//! holding them; private vertices and all elements are keyed by
//! `(id, rank)`, so ids minted independently on different ranks never
//! collide. The merged mesh is renumbered canonically: keys in sorted order
//! become ids `1..=n`.

use crate::algs::collective::gather_bytes;
use crate::algs::communicator::Communicator;
use crate::algs::wire::{decode_fragment, encode_fragment};
use crate::data::fragment::{MeshFragment, Tetra, Vertex};
use crate::data::solution::SolutionField;
use crate::geometry::scaling::ScalingState;
use crate::mesh_error::MeshAdaptError;
use crate::run::context::RunContext;
use crate::topology::point::PointId;
use itertools::Itertools;
use std::collections::BTreeMap;

/// `(global id, owning rank)` of a vertex.
type VertexKey = (PointId, usize);
/// `(local id, rank)` of an element.
type ElementKey = (PointId, usize);

fn inconsistent(message: String) -> MeshAdaptError {
    MeshAdaptError::MergeInconsistency(message)
}

struct MergedVertex<'a> {
    vertex: Vertex,
    values: Option<&'a [f64]>,
    from: usize,
}

fn within(a: &[f64], b: &[f64], tolerance: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

fn owner_of(fragment: &MeshFragment, rank: usize, v: PointId) -> usize {
    fragment
        .interface
        .get(&v)
        .and_then(|sharers| sharers.first().copied())
        .map_or(rank, |lowest| lowest.min(rank))
}

/// Common scaling state and solution size of the non-empty fragments.
fn common_state(
    fragments: &[(usize, MeshFragment)],
) -> Result<(ScalingState, Option<usize>), MeshAdaptError> {
    let mut seen: Option<(usize, ScalingState, Option<usize>)> = None;
    for (rank, f) in fragments.iter().filter(|(_, f)| !f.is_empty()) {
        let sol_size = f.solution.as_ref().map(SolutionField::size);
        match seen {
            None => seen = Some((*rank, f.scaling(), sol_size)),
            Some((first, scaling, size)) => {
                if scaling != f.scaling() {
                    return Err(inconsistent(format!(
                        "ranks {first} and {rank} disagree on scaling ({} vs {})",
                        scaling.label(),
                        f.scaling().label()
                    )));
                }
                if size != sol_size {
                    return Err(inconsistent(format!(
                        "ranks {first} and {rank} disagree on solution size ({size:?} vs {sol_size:?})"
                    )));
                }
            }
        }
    }
    Ok(seen.map_or((ScalingState::Unscaled, None), |(_, s, z)| (s, z)))
}

fn check_interfaces(fragments: &[(usize, MeshFragment)]) -> Result<(), MeshAdaptError> {
    let by_rank: BTreeMap<usize, &MeshFragment> = fragments.iter().map(|(r, f)| (*r, f)).collect();
    for (rank, f) in fragments {
        for (v, sharers) in &f.interface {
            if !f.vertices.contains_key(v) {
                return Err(inconsistent(format!(
                    "rank {rank} tags vertex {v} as shared but does not hold it"
                )));
            }
            for s in sharers {
                let mirrored = by_rank
                    .get(s)
                    .and_then(|other| other.interface.get(v))
                    .is_some_and(|back| back.contains(rank));
                if !mirrored {
                    return Err(inconsistent(format!(
                        "shared vertex {v} of rank {rank} is missing on declared sharer {s}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Merge `(rank, fragment)` pairs into one canonically numbered fragment.
///
/// Shared copies must agree within `tolerance` on coordinates and solution
/// values. Nothing is returned on inconsistency.
pub fn merge_fragments(
    fragments: Vec<(usize, MeshFragment)>,
    tolerance: f64,
) -> Result<MeshFragment, MeshAdaptError> {
    if let Some(rank) = fragments.iter().map(|(r, _)| *r).duplicates().next() {
        return Err(inconsistent(format!("rank {rank} contributed twice")));
    }
    let (scaling, sol_size) = common_state(&fragments)?;
    check_interfaces(&fragments)?;

    let mut vertices: BTreeMap<VertexKey, MergedVertex<'_>> = BTreeMap::new();
    for (rank, f) in &fragments {
        for (&id, vertex) in &f.vertices {
            let key = (id, owner_of(f, *rank, id));
            let values = f.solution.as_ref().and_then(|s| s.get(id));
            if sol_size.is_some() && values.is_none() {
                return Err(inconsistent(format!(
                    "vertex {id} of rank {rank} has no solution value"
                )));
            }
            match vertices.get(&key) {
                None => {
                    vertices.insert(
                        key,
                        MergedVertex {
                            vertex: *vertex,
                            values,
                            from: *rank,
                        },
                    );
                }
                Some(kept) => {
                    if !within(&kept.vertex.coords, &vertex.coords, tolerance) {
                        return Err(inconsistent(format!(
                            "shared vertex {id} differs between ranks {} and {rank}: {:?} vs {:?}",
                            kept.from, kept.vertex.coords, vertex.coords
                        )));
                    }
                    let agree = match (kept.values, values) {
                        (Some(a), Some(b)) => within(a, b, tolerance),
                        (None, None) => true,
                        _ => false,
                    };
                    if !agree {
                        return Err(inconsistent(format!(
                            "solution at shared vertex {id} differs between ranks {} and {rank}",
                            kept.from
                        )));
                    }
                }
            }
        }
    }

    let mut elements: BTreeMap<ElementKey, ([VertexKey; 4], i32)> = BTreeMap::new();
    for (rank, f) in &fragments {
        for (&id, t) in &f.tetrahedra {
            let mut keys = [(id, *rank); 4];
            for (slot, &v) in keys.iter_mut().zip(&t.vertices) {
                if !f.vertices.contains_key(&v) {
                    return Err(inconsistent(format!(
                        "element {id} of rank {rank} references unknown vertex {v}"
                    )));
                }
                *slot = (v, owner_of(f, *rank, v));
            }
            elements.insert((id, *rank), (keys, t.reference));
        }
    }

    // Canonical renumbering.
    let mut out = MeshFragment::new();
    let mut solution = sol_size.map(SolutionField::new).transpose()?;
    let mut new_id: BTreeMap<VertexKey, PointId> = BTreeMap::new();
    let mut next = PointId::new(1)?;
    for (key, merged) in &vertices {
        out.insert_vertex(next, merged.vertex);
        if let (Some(sol), Some(values)) = (solution.as_mut(), merged.values) {
            sol.set(next, values)?;
        }
        new_id.insert(*key, next);
        next = next.next()?;
    }
    let mut next = PointId::new(1)?;
    for (keys, reference) in elements.values() {
        let mut tetra = Tetra::new([next; 4]);
        tetra.reference = *reference;
        for (slot, key) in tetra.vertices.iter_mut().zip(keys) {
            *slot = *new_id
                .get(key)
                .ok_or_else(|| inconsistent(format!("vertex {key:?} vanished during merge")))?;
        }
        out.insert_tetra(next, tetra);
        next = next.next()?;
    }
    out.solution = solution;
    out.set_scaling(scaling);
    Ok(out)
}

/// Gather every fragment onto `target` and merge them there.
///
/// Non-target ranks release their fragment. On failure the target's
/// fragment is left exactly as it was.
pub fn merge_on_target<C: Communicator>(
    comm: &C,
    ctx: &RunContext,
    fragment: &mut MeshFragment,
    target: usize,
) -> Result<(), MeshAdaptError> {
    let encoded = encode_fragment(fragment).map_err(|e| e.to_string());
    let Some(items) = gather_bytes(comm, target, encoded)? else {
        fragment.release();
        return Ok(());
    };
    let mut fragments = Vec::with_capacity(items.len());
    for (rank, item) in items.into_iter().enumerate() {
        let bytes = item.map_err(|message| inconsistent(format!("rank {rank}: {message}")))?;
        fragments.push((rank, decode_fragment(&bytes)?));
    }
    let merged = merge_fragments(fragments, ctx.config.merge_tolerance)?;
    if ctx.verbosity > 0 {
        log::info!(
            "merged {} vertices and {} elements on rank {target}",
            merged.n_vertices(),
            merged.n_elements()
        );
    }
    *fragment = merged;
    Ok(())
}
