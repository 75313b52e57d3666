//! Face hashing for tetrahedral fragments.
//!
//! Face `i` of a tetrahedron is the triangle opposite vertex `i`, listed so
//! that its normal points out of a positively oriented element:
//!
//! ```text
//! face 0: [1, 2, 3]   face 1: [0, 3, 2]
//! face 2: [0, 1, 3]   face 3: [0, 2, 1]
//! ```

use crate::data::fragment::{BoundaryTriangle, MeshFragment};
use crate::geometry::quality::TET_EDGES;
use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;

/// Local vertex indices of each face, outward for positive orientation.
pub const TET_FACES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Orientation-free key of a triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey(pub [PointId; 3]);

impl FaceKey {
    pub fn new(mut v: [PointId; 3]) -> Self {
        v.sort_unstable();
        FaceKey(v)
    }
}

/// Element-to-element adjacency through faces.
#[derive(Clone, Debug, Default)]
pub struct TetraAdjacency {
    /// `neighbours[t][i]` is the element across face `i` of `t`.
    pub neighbours: BTreeMap<PointId, [Option<PointId>; 4]>,
    /// Faces with a single incident element, as `(element, face index)`.
    pub open_faces: Vec<(PointId, usize)>,
}

impl TetraAdjacency {
    /// Oriented triangle of face `face` of `element`.
    pub fn face_vertices(
        fragment: &MeshFragment,
        element: PointId,
        face: usize,
    ) -> Option<[PointId; 3]> {
        let t = fragment.tetrahedra.get(&element)?;
        let [a, b, c] = TET_FACES[face];
        Some([t.vertices[a], t.vertices[b], t.vertices[c]])
    }
}

/// Hash every face of `fragment` and pair elements across shared faces.
///
/// Fails on a face shared by more than two elements or on an element that
/// references a missing vertex.
pub fn hash_tetrahedra(fragment: &MeshFragment) -> Result<TetraAdjacency, MeshAdaptError> {
    fragment.check_connectivity()?;
    let mut incident: HashMap<FaceKey, Vec<(PointId, usize)>> =
        HashMap::with_capacity(2 * fragment.n_elements());
    for (&id, t) in &fragment.tetrahedra {
        for (i, [a, b, c]) in TET_FACES.iter().enumerate() {
            let key = FaceKey::new([t.vertices[*a], t.vertices[*b], t.vertices[*c]]);
            incident.entry(key).or_default().push((id, i));
        }
    }

    let mut adj = TetraAdjacency::default();
    for &id in fragment.tetrahedra.keys() {
        adj.neighbours.insert(id, [None; 4]);
    }
    let mut faces: Vec<_> = incident.into_iter().collect();
    faces.sort_unstable_by_key(|(k, _)| *k);
    for (key, elems) in faces {
        match elems.as_slice() {
            [single] => adj.open_faces.push(*single),
            [(t0, f0), (t1, f1)] => {
                if let Some(n) = adj.neighbours.get_mut(t0) {
                    n[*f0] = Some(*t1);
                }
                if let Some(n) = adj.neighbours.get_mut(t1) {
                    n[*f1] = Some(*t0);
                }
            }
            many => {
                return Err(MeshAdaptError::NonManifoldFace {
                    face: key.0,
                    count: many.len(),
                });
            }
        }
    }
    Ok(adj)
}

/// Every edge of the fragment once, as `(min, max)` vertex pairs in order.
pub fn unique_edges(fragment: &MeshFragment) -> Vec<(PointId, PointId)> {
    let mut seen = HashSet::with_capacity(fragment.n_elements() * 2);
    for t in fragment.tetrahedra.values() {
        for (a, b) in TET_EDGES {
            let (u, v) = (t.vertices[a], t.vertices[b]);
            seen.insert(if u < v { (u, v) } else { (v, u) });
        }
    }
    let mut out: Vec<_> = seen.into_iter().collect();
    out.sort_unstable();
    out
}

/// Rebuild `fragment.boundary` from the open faces of the element set.
///
/// Returns the number of boundary triangles.
pub fn rebuild_boundary(fragment: &mut MeshFragment) -> Result<usize, MeshAdaptError> {
    let adj = hash_tetrahedra(fragment)?;
    let mut boundary = Vec::with_capacity(adj.open_faces.len());
    for &(element, face) in &adj.open_faces {
        let vertices = TetraAdjacency::face_vertices(fragment, element, face).ok_or(
            MeshAdaptError::InvalidInput(format!("element {element} vanished during hashing")),
        )?;
        let reference = fragment.tetrahedra[&element].reference;
        boundary.push(BoundaryTriangle {
            vertices,
            reference,
        });
    }
    let n = boundary.len();
    fragment.boundary = boundary;
    log::debug!("rebuilt {n} boundary triangles");
    Ok(n)
}
