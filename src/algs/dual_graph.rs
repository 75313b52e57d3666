//! Build a CSR (compressed-sparse-row) *dual graph* of a tetrahedral mesh.
//
// Each *element* is a graph vertex; an undirected edge joins two elements
// that share a face.
//
// * `xadj[i] .. xadj[i+1]`   = neighbour list of element *i*
// * `adjncy`                 = concatenated neighbour indices
// * `vwgt[i]`                = vertex weight, default = 1
//
// The graph is **symmetrised**, **self-free**, and neighbour lists are sorted
// so traversals over it are deterministic.

use crate::data::fragment::MeshFragment;
use crate::mesh_error::MeshAdaptError;
use crate::topology::adjacency::hash_tetrahedra;
use crate::topology::point::PointId;
use std::collections::HashMap;

/// CSR triple
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DualGraph {
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub vwgt: Vec<i32>,
}

impl DualGraph {
    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    #[inline]
    pub fn neighbours(&self, i: usize) -> &[usize] {
        &self.adjncy[self.xadj[i]..self.xadj[i + 1]]
    }
}

/// Build the face-dual graph. Also returns `Vec<PointId>` mapping CSR vertex
/// → element id (ascending id order).
pub fn build_dual_with_order(
    fragment: &MeshFragment,
) -> Result<(DualGraph, Vec<PointId>), MeshAdaptError> {
    let adj = hash_tetrahedra(fragment)?;
    let cells: Vec<PointId> = fragment.tetrahedra.keys().copied().collect();
    let idx_of: HashMap<PointId, usize> =
        cells.iter().enumerate().map(|(i, &c)| (c, i)).collect();

    let mut xadj = Vec::with_capacity(cells.len() + 1);
    let mut adjncy = Vec::with_capacity(4 * cells.len());
    xadj.push(0);
    for c in &cells {
        let mut nbrs: Vec<usize> = adj
            .neighbours
            .get(c)
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|n| idx_of.get(n).copied())
            .collect();
        nbrs.sort_unstable();
        nbrs.dedup();
        adjncy.extend(nbrs);
        xadj.push(adjncy.len());
    }
    let vwgt = vec![1; cells.len()];
    Ok((DualGraph { xadj, adjncy, vwgt }, cells))
}
