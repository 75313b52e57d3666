//! The portion of the global mesh owned by one process.
//!
//! Before distribution the root's fragment is the whole mesh; after
//! distribution fragments are disjoint by element and collectively exhaustive;
//! after merging the target's fragment is the whole mesh again and every other
//! fragment is released.

use crate::data::solution::SolutionField;
use crate::geometry::scaling::ScalingState;
use crate::mesh_error::MeshAdaptError;
use crate::topology::analysis::MeshAnalysis;
use crate::topology::point::PointId;
use std::collections::{BTreeMap, BTreeSet};

/// A mesh vertex: coordinates plus an integer reference tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub coords: [f64; 3],
    pub reference: i32,
}

impl Vertex {
    pub fn new(coords: [f64; 3]) -> Self {
        Self {
            coords,
            reference: 0,
        }
    }
}

/// A linear tetrahedron `[v0, v1, v2, v3]`, positively oriented when
/// `det(v1 - v0, v2 - v0, v3 - v0) > 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tetra {
    pub vertices: [PointId; 4],
    pub reference: i32,
}

impl Tetra {
    pub fn new(vertices: [PointId; 4]) -> Self {
        Self {
            vertices,
            reference: 0,
        }
    }
}

/// Outward-oriented boundary triangle rebuilt before output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryTriangle {
    pub vertices: [PointId; 3],
    /// Reference tag inherited from the owning tetrahedron.
    pub reference: i32,
}

/// Process-local mesh state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshFragment {
    pub vertices: BTreeMap<PointId, Vertex>,
    pub tetrahedra: BTreeMap<PointId, Tetra>,
    pub solution: Option<SolutionField>,
    /// Vertices shared with other fragments, mapped to the *other* ranks that
    /// hold a copy. Shared vertices are frozen during adaptation.
    pub interface: BTreeMap<PointId, BTreeSet<usize>>,
    /// Boundary triangles; only populated by the finalize step.
    pub boundary: Vec<BoundaryTriangle>,
    pub(crate) analysis: Option<MeshAnalysis>,
    scaling: ScalingState,
}

impl MeshFragment {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.tetrahedra.is_empty()
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn n_elements(&self) -> usize {
        self.tetrahedra.len()
    }

    #[inline]
    pub fn scaling(&self) -> ScalingState {
        self.scaling
    }

    pub(crate) fn set_scaling(&mut self, state: ScalingState) {
        self.scaling = state;
    }

    /// Structural analysis recorded by the preprocessor, if it ran.
    pub fn analysis(&self) -> Option<&MeshAnalysis> {
        self.analysis.as_ref()
    }

    pub fn insert_vertex(&mut self, id: PointId, vertex: Vertex) {
        self.vertices.insert(id, vertex);
    }

    pub fn insert_tetra(&mut self, id: PointId, tetra: Tetra) {
        self.tetrahedra.insert(id, tetra);
    }

    /// Whether `vertex` is shared with another fragment.
    #[inline]
    pub fn is_shared(&self, vertex: PointId) -> bool {
        self.interface.contains_key(&vertex)
    }

    /// Coordinates of the four corners of `tetra`.
    pub fn corners(&self, id: PointId, tetra: &Tetra) -> Result<[[f64; 3]; 4], MeshAdaptError> {
        let mut out = [[0.0; 3]; 4];
        for (slot, &v) in out.iter_mut().zip(tetra.vertices.iter()) {
            let vertex = self
                .vertices
                .get(&v)
                .ok_or(MeshAdaptError::MissingVertex {
                    element: id,
                    vertex: v,
                })?;
            *slot = vertex.coords;
        }
        Ok(out)
    }

    /// Smallest vertex id not yet used on this fragment.
    pub fn fresh_vertex_id(&self) -> Result<PointId, MeshAdaptError> {
        match self.vertices.keys().next_back() {
            Some(last) => last.next(),
            None => PointId::new(1),
        }
    }

    /// Smallest element id not yet used on this fragment.
    pub fn fresh_element_id(&self) -> Result<PointId, MeshAdaptError> {
        match self.tetrahedra.keys().next_back() {
            Some(last) => last.next(),
            None => PointId::new(1),
        }
    }

    /// Check that every element references distinct vertices held here.
    pub fn check_connectivity(&self) -> Result<(), MeshAdaptError> {
        for (&id, tetra) in &self.tetrahedra {
            for (i, &v) in tetra.vertices.iter().enumerate() {
                if !self.vertices.contains_key(&v) {
                    return Err(MeshAdaptError::MissingVertex {
                        element: id,
                        vertex: v,
                    });
                }
                if tetra.vertices[..i].contains(&v) {
                    return Err(MeshAdaptError::RepeatedVertex(id));
                }
            }
        }
        Ok(())
    }

    /// Check that every vertex is a corner of some element.
    pub fn check_vertex_use(&self) -> Result<(), MeshAdaptError> {
        let used: BTreeSet<PointId> = self
            .tetrahedra
            .values()
            .flat_map(|t| t.vertices)
            .collect();
        match self.vertices.keys().find(|v| !used.contains(v)) {
            Some(&v) => Err(MeshAdaptError::UnusedVertex(v)),
            None => Ok(()),
        }
    }

    /// Check that the solution (if any) covers exactly the vertex set.
    pub fn check_solution(&self) -> Result<(), MeshAdaptError> {
        let Some(sol) = &self.solution else {
            return Ok(());
        };
        let expected = self.n_vertices() * sol.size();
        let covered = self
            .vertices
            .keys()
            .filter(|v| sol.get(**v).is_some())
            .count();
        if covered != self.n_vertices() || sol.len() != self.n_vertices() {
            return Err(MeshAdaptError::SolutionLength {
                expected,
                found: sol.len() * sol.size(),
            });
        }
        Ok(())
    }

    /// Drop all mesh state; used on non-target processes after a merge.
    pub fn release(&mut self) {
        *self = MeshFragment::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    fn unit_tet() -> MeshFragment {
        let mut f = MeshFragment::new();
        f.insert_vertex(pid(1), Vertex::new([0.0, 0.0, 0.0]));
        f.insert_vertex(pid(2), Vertex::new([1.0, 0.0, 0.0]));
        f.insert_vertex(pid(3), Vertex::new([0.0, 1.0, 0.0]));
        f.insert_vertex(pid(4), Vertex::new([0.0, 0.0, 1.0]));
        f.insert_tetra(pid(1), Tetra::new([pid(1), pid(2), pid(3), pid(4)]));
        f
    }

    #[test]
    fn fresh_ids_follow_the_largest() {
        let f = unit_tet();
        assert_eq!(f.fresh_vertex_id().unwrap(), pid(5));
        assert_eq!(f.fresh_element_id().unwrap(), pid(2));
        assert_eq!(MeshFragment::new().fresh_vertex_id().unwrap(), pid(1));
    }

    #[test]
    fn connectivity_errors() {
        let mut f = unit_tet();
        assert!(f.check_connectivity().is_ok());
        f.insert_tetra(pid(2), Tetra::new([pid(1), pid(2), pid(3), pid(9)]));
        assert!(matches!(
            f.check_connectivity(),
            Err(MeshAdaptError::MissingVertex { .. })
        ));
        f.tetrahedra.remove(&pid(2));
        f.insert_tetra(pid(3), Tetra::new([pid(1), pid(2), pid(2), pid(4)]));
        assert!(matches!(
            f.check_connectivity(),
            Err(MeshAdaptError::RepeatedVertex(_))
        ));
    }

    #[test]
    fn isolated_vertex_is_reported() {
        let mut f = unit_tet();
        assert!(f.check_vertex_use().is_ok());
        f.insert_vertex(pid(7), Vertex::new([2.0, 2.0, 2.0]));
        assert!(matches!(
            f.check_vertex_use(),
            Err(MeshAdaptError::UnusedVertex(v)) if v == pid(7)
        ));
    }

    #[test]
    fn solution_must_cover_all_vertices() {
        let mut f = unit_tet();
        let mut sol = SolutionField::new(1).unwrap();
        sol.set(pid(1), &[0.1]).unwrap();
        f.solution = Some(sol);
        assert!(f.check_solution().is_err());
        for v in 2..=4 {
            f.solution.as_mut().unwrap().set(pid(v), &[0.1]).unwrap();
        }
        assert!(f.check_solution().is_ok());
    }

    #[test]
    fn release_clears_everything() {
        let mut f = unit_tet();
        f.interface.insert(pid(1), [1usize].into_iter().collect());
        f.release();
        assert!(f.is_empty());
        assert!(f.interface.is_empty());
    }
}
