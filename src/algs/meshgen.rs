//! Structured tetrahedral box meshes.
//!
//! Each hexahedral cell is split into the six Kuhn tetrahedra that share the
//! main diagonal `(0,0,0) → (1,1,1)`; the split is conforming across cells.

use crate::data::fragment::{MeshFragment, Tetra, Vertex};
use crate::data::solution::SolutionField;
use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;

/// Axis permutations of the Kuhn split with their parity.
const KUHN: [([usize; 3], bool); 6] = [
    ([0, 1, 2], true),
    ([1, 2, 0], true),
    ([2, 0, 1], true),
    ([0, 2, 1], false),
    ([1, 0, 2], false),
    ([2, 1, 0], false),
];

fn invalid_geometry(message: impl Into<String>) -> MeshAdaptError {
    MeshAdaptError::InvalidGeometry(message.into())
}

/// Generate a box `[0, extent]` with `cells[0]×cells[1]×cells[2]` hexahedral
/// cells, six positively oriented tetrahedra each.
///
/// Vertex ids are `1 + i + (nx+1)·(j + (ny+1)·k)`; element ids are
/// consecutive from 1 in cell order.
pub fn box_mesh(cells: [usize; 3], extent: [f64; 3]) -> Result<MeshFragment, MeshAdaptError> {
    let [nx, ny, nz] = cells;
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(invalid_geometry("nx, ny, and nz must be positive"));
    }
    if extent.iter().any(|e| !e.is_finite() || *e <= 0.0) {
        return Err(invalid_geometry("box extent must be positive"));
    }
    let d = [
        extent[0] / nx as f64,
        extent[1] / ny as f64,
        extent[2] / nz as f64,
    ];
    let row_stride = nx + 1;
    let slab_stride = row_stride * (ny + 1);
    let vid = |i: usize, j: usize, k: usize| PointId::new((1 + i + row_stride * j + slab_stride * k) as u64);

    let mut mesh = MeshFragment::new();
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                let x = [d[0] * i as f64, d[1] * j as f64, d[2] * k as f64];
                mesh.insert_vertex(vid(i, j, k)?, Vertex::new(x));
            }
        }
    }

    let mut next = PointId::new(1)?;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for (perm, even) in KUHN {
                    let mut corner = [i, j, k];
                    let mut path = [vid(i, j, k)?; 4];
                    for (step, &axis) in perm.iter().enumerate() {
                        corner[axis] += 1;
                        path[step + 1] = vid(corner[0], corner[1], corner[2])?;
                    }
                    if !even {
                        path.swap(2, 3);
                    }
                    mesh.insert_tetra(next, Tetra::new(path));
                    next = next.next()?;
                }
            }
        }
    }
    Ok(mesh)
}

/// Constant isotropic size map over every vertex of `mesh`.
pub fn uniform_size_field(mesh: &MeshFragment, h: f64) -> Result<SolutionField, MeshAdaptError> {
    let mut sol = SolutionField::new(1)?;
    for &v in mesh.vertices.keys() {
        sol.set(v, &[h])?;
    }
    Ok(sol)
}
