//! Deterministic element partitioning over the face-dual graph.
//!
//! Parts are grown one at a time by breadth-first search from the lowest
//! unassigned element, so every rank computes the same map from the same
//! mesh. Part sizes differ by at most one element.

use crate::algs::dual_graph::{DualGraph, build_dual_with_order};
use crate::data::fragment::MeshFragment;
use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;
use std::collections::{BTreeMap, VecDeque};

/// Element → part assignment.
pub type PartitionMap = BTreeMap<PointId, usize>;

/// Target size of each of `n_parts` parts for `n` elements.
pub fn part_targets(n: usize, n_parts: usize) -> Vec<usize> {
    (0..n_parts)
        .map(|p| n / n_parts + usize::from(p < n % n_parts))
        .collect()
}

fn grow_parts(graph: &DualGraph, n_parts: usize) -> Vec<usize> {
    let n = graph.n_vertices();
    let mut part = vec![usize::MAX; n];
    let mut next_seed = 0;
    let mut queue = VecDeque::new();
    for (p, target) in part_targets(n, n_parts).into_iter().enumerate() {
        let mut size = 0;
        queue.clear();
        while size < target {
            let v = match queue.pop_front() {
                Some(v) => v,
                None => {
                    // Disconnected remainder: restart from the lowest free element.
                    while part[next_seed] != usize::MAX {
                        next_seed += 1;
                    }
                    next_seed
                }
            };
            if part[v] != usize::MAX {
                continue;
            }
            part[v] = p;
            size += 1;
            queue.extend(
                graph
                    .neighbours(v)
                    .iter()
                    .copied()
                    .filter(|&u| part[u] == usize::MAX),
            );
        }
    }
    part
}

/// Assign every element of `fragment` to one of `n_parts` parts.
pub fn partition_elements(
    fragment: &MeshFragment,
    n_parts: usize,
) -> Result<PartitionMap, MeshAdaptError> {
    if n_parts == 0 {
        return Err(MeshAdaptError::Partition(
            "cannot partition into zero parts".into(),
        ));
    }
    let (graph, order) = build_dual_with_order(fragment)?;
    let parts = grow_parts(&graph, n_parts);
    Ok(order.into_iter().zip(parts).collect())
}

/// Number of dual-graph edges whose endpoints lie in different parts.
pub fn edge_cut(graph: &DualGraph, parts: &[usize]) -> usize {
    (0..graph.n_vertices())
        .flat_map(|i| graph.neighbours(i).iter().map(move |&j| (i, j)))
        .filter(|&(i, j)| i < j && parts[i] != parts[j])
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::box_mesh;

    #[test]
    fn targets_differ_by_at_most_one() {
        assert_eq!(part_targets(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(part_targets(2, 4), vec![1, 1, 0, 0]);
    }

    #[test]
    fn every_element_gets_one_part() {
        let mesh = box_mesh([3, 2, 2], [1.0; 3]).unwrap();
        let map = partition_elements(&mesh, 5).unwrap();
        assert_eq!(map.len(), mesh.n_elements());
        let mut sizes = [0usize; 5];
        for &p in map.values() {
            sizes[p] += 1;
        }
        let (lo, hi) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
        assert!(hi - lo <= 1, "{sizes:?}");
    }

    #[test]
    fn partition_is_deterministic() {
        let mesh = box_mesh([2, 2, 2], [1.0; 3]).unwrap();
        assert_eq!(
            partition_elements(&mesh, 3).unwrap(),
            partition_elements(&mesh, 3).unwrap()
        );
    }

    #[test]
    fn bfs_parts_cut_less_than_round_robin() {
        let mesh = box_mesh([4, 2, 2], [1.0; 3]).unwrap();
        let (graph, _) = build_dual_with_order(&mesh).unwrap();
        let grown = grow_parts(&graph, 4);
        let striped: Vec<usize> = (0..graph.n_vertices()).map(|i| i % 4).collect();
        assert!(edge_cut(&graph, &grown) < edge_cut(&graph, &striped));
    }

    #[test]
    fn zero_parts_is_an_error() {
        let mesh = box_mesh([1, 1, 1], [1.0; 3]).unwrap();
        assert!(matches!(
            partition_elements(&mesh, 0),
            Err(MeshAdaptError::Partition(_))
        ));
    }
}
