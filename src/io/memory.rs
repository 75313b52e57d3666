//! In-memory mesh store with write fault injection.
//!
//! Clones share the same contents, so a test can hand one clone to the
//! controller and inspect another afterwards.

use super::MeshStore;
use crate::data::fragment::MeshFragment;
use crate::data::solution::SolutionField;
use crate::mesh_error::MeshAdaptError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    meshes: BTreeMap<PathBuf, MeshFragment>,
    solutions: BTreeMap<PathBuf, SolutionField>,
    failing_writes: BTreeSet<PathBuf>,
    written: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mesh(&self, path: impl Into<PathBuf>, mesh: MeshFragment) {
        self.inner.lock().meshes.insert(path.into(), mesh);
    }

    pub fn insert_solution(&self, path: impl Into<PathBuf>, solution: SolutionField) {
        self.inner.lock().solutions.insert(path.into(), solution);
    }

    /// Make every later write to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.inner.lock().failing_writes.insert(path.into());
    }

    pub fn mesh(&self, path: impl AsRef<Path>) -> Option<MeshFragment> {
        self.inner.lock().meshes.get(path.as_ref()).cloned()
    }

    pub fn solution(&self, path: impl AsRef<Path>) -> Option<SolutionField> {
        self.inner.lock().solutions.get(path.as_ref()).cloned()
    }

    /// Paths successfully written, in write order.
    pub fn written_paths(&self) -> Vec<PathBuf> {
        self.inner.lock().written.clone()
    }

    fn check_writable(inner: &Inner, path: &Path) -> Result<(), MeshAdaptError> {
        if inner.failing_writes.contains(path) {
            return Err(MeshAdaptError::io(
                path,
                Error::new(ErrorKind::PermissionDenied, "write refused"),
            ));
        }
        Ok(())
    }
}

impl MeshStore for MemoryStore {
    fn load_mesh(&mut self, path: &Path) -> Result<MeshFragment, MeshAdaptError> {
        let mut mesh = self.inner.lock().meshes.get(path).cloned().ok_or_else(|| {
            MeshAdaptError::io(path, Error::new(ErrorKind::NotFound, "no such mesh"))
        })?;
        mesh.solution = None;
        Ok(mesh)
    }

    fn load_solution(
        &mut self,
        path: &Path,
        fragment: &mut MeshFragment,
    ) -> Result<bool, MeshAdaptError> {
        match self.inner.lock().solutions.get(path) {
            Some(sol) => {
                fragment.solution = Some(sol.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn save_mesh(&mut self, path: &Path, fragment: &MeshFragment) -> Result<(), MeshAdaptError> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner, path)?;
        let mut mesh = fragment.clone();
        mesh.solution = None;
        inner.meshes.insert(path.to_path_buf(), mesh);
        inner.written.push(path.to_path_buf());
        Ok(())
    }

    fn save_solution(
        &mut self,
        path: &Path,
        fragment: &MeshFragment,
    ) -> Result<(), MeshAdaptError> {
        let mut inner = self.inner.lock();
        Self::check_writable(&inner, path)?;
        let sol = fragment.solution.clone().ok_or_else(|| {
            MeshAdaptError::InvalidInput("fragment carries no solution to save".into())
        })?;
        inner.solutions.insert(path.to_path_buf(), sol);
        inner.written.push(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::{box_mesh, uniform_size_field};

    #[test]
    fn clones_share_contents() {
        let store = MemoryStore::new();
        let mut handle = store.clone();
        let mut mesh = box_mesh([1, 1, 1], [1.0; 3]).unwrap();
        mesh.solution = Some(uniform_size_field(&mesh, 0.1).unwrap());
        handle.save_mesh(Path::new("a.mesh"), &mesh).unwrap();
        handle.save_solution(Path::new("a.sol"), &mesh).unwrap();
        assert_eq!(store.mesh("a.mesh").unwrap().n_elements(), 6);
        assert!(store.mesh("a.mesh").unwrap().solution.is_none());
        assert_eq!(store.solution("a.sol").unwrap().len(), 8);
        assert_eq!(
            store.written_paths(),
            vec![PathBuf::from("a.mesh"), PathBuf::from("a.sol")]
        );
    }

    #[test]
    fn injected_write_failure() {
        let mut store = MemoryStore::new();
        store.fail_writes_to("out.sol");
        let mesh = box_mesh([1, 1, 1], [1.0; 3]).unwrap();
        assert!(store.save_mesh(Path::new("out.sol"), &mesh).is_err());
        assert!(store.written_paths().is_empty());
    }

    #[test]
    fn missing_solution_is_not_an_error() {
        let mut store = MemoryStore::new();
        let mut mesh = MeshFragment::new();
        assert!(!store.load_solution(Path::new("m.sol"), &mut mesh).unwrap());
        assert!(store.load_mesh(Path::new("m.mesh")).is_err());
    }
}
