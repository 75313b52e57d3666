//! Mesh and solution persistence.
//!
//! The controller only talks to a [`MeshStore`]; it is invoked on the root
//! (load) and on the merge target (save). Two stores ship with the crate:
//! [`JsonMeshStore`] for files and [`MemoryStore`] for tests and embedding.

pub mod json;
pub mod memory;

pub use json::JsonMeshStore;
pub use memory::MemoryStore;

use crate::data::fragment::MeshFragment;
use crate::mesh_error::MeshAdaptError;
use std::path::Path;

/// Persistence collaborator for meshes and their solution fields.
pub trait MeshStore {
    /// Read a mesh; the returned fragment is unscaled and has no solution.
    fn load_mesh(&mut self, path: &Path) -> Result<MeshFragment, MeshAdaptError>;

    /// Attach the solution stored at `path` to `fragment`.
    ///
    /// Returns `Ok(false)` when there is no solution at `path`; a solution
    /// that exists but cannot be read is an error.
    fn load_solution(
        &mut self,
        path: &Path,
        fragment: &mut MeshFragment,
    ) -> Result<bool, MeshAdaptError>;

    /// Write vertices, elements and boundary triangles.
    fn save_mesh(&mut self, path: &Path, fragment: &MeshFragment) -> Result<(), MeshAdaptError>;

    /// Write the solution field of `fragment`.
    fn save_solution(
        &mut self,
        path: &Path,
        fragment: &MeshFragment,
    ) -> Result<(), MeshAdaptError>;
}
