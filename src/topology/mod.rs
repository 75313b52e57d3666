//! Point identifiers and tetrahedral connectivity.

pub mod adjacency;
pub mod analysis;
pub mod point;

pub use point::PointId;
