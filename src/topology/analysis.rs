//! Structural analysis of a scaled fragment before remeshing.
//!
//! The analysis is the load-bearing step of preprocessing: a fragment that
//! fails it cannot be remeshed safely.

use crate::data::fragment::MeshFragment;
use crate::geometry::quality::tetra_quality;
use crate::mesh_error::MeshAdaptError;
use crate::run::context::RunContext;
use crate::topology::adjacency::{TetraAdjacency, hash_tetrahedra, unique_edges};
use crate::topology::point::PointId;

/// Volumes at or below this (in the unit reference frame) are degenerate.
pub const MIN_VOLUME: f64 = 1e-20;

/// Summary produced by a successful analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshAnalysis {
    pub n_edges: usize,
    /// Open faces lying on the physical boundary.
    pub n_boundary_faces: usize,
    /// Open faces lying on a partition interface (all three vertices shared
    /// with one common neighbour rank).
    pub n_interface_faces: usize,
}

/// Pluggable structural analysis.
pub trait AnalysisKernel {
    fn analyse(
        &mut self,
        fragment: &MeshFragment,
        ctx: &RunContext,
    ) -> Result<MeshAnalysis, MeshAdaptError>;
}

/// Default analysis: connectivity, orientation and manifoldness checks plus
/// boundary classification.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopologyAnalysis;

impl AnalysisKernel for TopologyAnalysis {
    fn analyse(
        &mut self,
        fragment: &MeshFragment,
        _ctx: &RunContext,
    ) -> Result<MeshAnalysis, MeshAdaptError> {
        for (&id, t) in &fragment.tetrahedra {
            let corners = fragment.corners(id, t)?;
            let q = tetra_quality(&corners);
            if !q.volume.is_finite() || q.volume <= MIN_VOLUME {
                return Err(MeshAdaptError::InvalidGeometry(format!(
                    "element {id} is inverted or flat (volume {:e})",
                    q.volume
                )));
            }
        }
        let adj = hash_tetrahedra(fragment)?;
        let mut analysis = MeshAnalysis {
            n_edges: unique_edges(fragment).len(),
            ..Default::default()
        };
        for &(element, face) in &adj.open_faces {
            let on_interface = TetraAdjacency::face_vertices(fragment, element, face)
                .is_some_and(|tri| shares_common_rank(fragment, &tri));
            if on_interface {
                analysis.n_interface_faces += 1;
            } else {
                analysis.n_boundary_faces += 1;
            }
        }
        Ok(analysis)
    }
}

fn shares_common_rank(fragment: &MeshFragment, tri: &[PointId; 3]) -> bool {
    let Some(first) = fragment.interface.get(&tri[0]) else {
        return false;
    };
    first.iter().any(|rank| {
        tri[1..].iter().all(|v| {
            fragment
                .interface
                .get(v)
                .is_some_and(|ranks| ranks.contains(rank))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::box_mesh;
    use crate::run::config::RunConfig;

    fn ctx() -> RunContext {
        RunContext::new(RunConfig::default(), 0, 1).unwrap()
    }

    #[test]
    fn cube_analysis() {
        let f = box_mesh([2, 1, 1], [2.0, 1.0, 1.0]).unwrap();
        let a = TopologyAnalysis.analyse(&f, &ctx()).unwrap();
        assert_eq!(a.n_boundary_faces, 2 * (2 * 2 + 2 * 1 + 2 * 2));
        assert_eq!(a.n_interface_faces, 0);
        assert!(a.n_edges > 0);
    }

    #[test]
    fn inverted_element_fails() {
        let mut f = box_mesh([1, 1, 1], [1.0, 1.0, 1.0]).unwrap();
        let (&id, t) = f.tetrahedra.iter_mut().next().unwrap();
        t.vertices.swap(0, 1);
        let err = TopologyAnalysis.analyse(&f, &ctx()).unwrap_err();
        assert!(err.to_string().contains(&id.to_string()));
    }
}
