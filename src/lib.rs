#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-adapt-run
//!
//! mesh-adapt-run drives one distributed adaptation of a tetrahedral mesh.
//! A group of cooperating processes loads a mesh on the root, splits it into
//! per-process fragments, scales them into a unit frame, hands them to a
//! parallel remesher, then brings everything back to physical coordinates,
//! merges the fragments into one mesh and writes it out.
//!
//! ## Layout
//! - [`run`]: configuration, the phase sequence, failure classification and
//!   the [`RunController`](run::RunController).
//! - [`algs`]: communicators and framed collectives, partitioning,
//!   distribution and merging of fragments.
//! - [`data`], [`topology`], [`geometry`]: fragments, solution fields,
//!   tetrahedral adjacency, scaling and quality diagnostics.
//! - [`io`]: the [`MeshStore`](io::MeshStore) collaborator with JSON and
//!   in-memory implementations.
//! - [`remesh`]: the [`RemeshEngine`](remesh::RemeshEngine) collaborator.
//!
//! ## Outcomes
//! Every process ends with the same [`RunOutcome`](run::RunOutcome):
//! success (exit code 0), low failure (1: something failed but a mesh in
//! physical coordinates was produced) or strong failure (2: nothing
//! trustworthy was written).
//!
//! ## Features
//! - `mpi-support`: an MPI communicator backend.
//! - `rayon`: parallel quality diagnostics.

pub mod algs;
pub mod data;
pub mod geometry;
pub mod io;
pub mod mesh_error;
pub mod remesh;
pub mod run;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    pub use crate::data::fragment::{MeshFragment, Tetra, Vertex};
    pub use crate::data::solution::SolutionField;
    pub use crate::io::{JsonMeshStore, MemoryStore, MeshStore};
    pub use crate::mesh_error::MeshAdaptError;
    pub use crate::remesh::{IdentityRemesher, RemeshEngine, RemeshError};
    pub use crate::run::{Phase, PhaseStatus, RunConfig, RunController, RunOutcome, RunReport};
    pub use crate::topology::analysis::{AnalysisKernel, TopologyAnalysis};
    pub use crate::topology::point::PointId;
}
