//! Mesh fragments and the solution fields attached to them.

pub mod fragment;
pub mod solution;

pub use fragment::{BoundaryTriangle, MeshFragment, Tetra, Vertex};
pub use solution::SolutionField;
