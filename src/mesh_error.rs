//! MeshAdaptError: unified error type for mesh-adapt-run public APIs
//!
//! Every fallible operation in the library reports through this type so the
//! run controller can classify failures without inspecting strings.

use crate::topology::point::PointId;
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the message-passing layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommError {
    /// A peer rank outside `0..size` was addressed.
    #[error("peer rank {peer} is outside a group of {size} processes")]
    PeerOutOfRange { peer: usize, size: usize },
    /// A receive completed without delivering any data.
    #[error("no message received from rank {0}")]
    NoMessage(usize),
    /// A frame shorter than its header announced.
    #[error("truncated frame from rank {peer}: expected {expected} bytes, got {found}")]
    Truncated {
        peer: usize,
        expected: usize,
        found: usize,
    },
    /// A peer reported a local failure instead of a payload.
    #[error("rank {rank} reported failure: {message}")]
    RemoteFailure { rank: usize, message: String },
    /// Process-group bootstrap failed.
    #[error("could not initialize the process group")]
    InitFailed,
}

/// Unified error type for mesh-adapt-run operations.
#[derive(Debug, Error)]
pub enum MeshAdaptError {
    /// Attempted to construct a PointId with a zero value (invalid).
    #[error("PointId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidPointId,
    /// An element references a vertex that the fragment does not hold.
    #[error("element {element} references missing vertex {vertex}")]
    MissingVertex { element: PointId, vertex: PointId },
    /// An element lists the same vertex more than once.
    #[error("element {0} repeats a vertex")]
    RepeatedVertex(PointId),
    /// A vertex is not a corner of any element.
    #[error("vertex {0} is not used by any element")]
    UnusedVertex(PointId),
    /// Geometry is inverted, degenerate or non-finite.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// A face is shared by more than two tetrahedra.
    #[error("non-manifold face {face:?} shared by {count} elements")]
    NonManifoldFace { face: [PointId; 3], count: usize },
    /// The solution field does not cover the vertex set.
    #[error("solution length mismatch: expected {expected} values, found {found}")]
    SolutionLength { expected: usize, found: usize },
    /// Only isotropic (1) and anisotropic (6) fields are understood.
    #[error("unsupported solution size {0} (expected 1 or 6)")]
    UnsupportedSolutionSize(usize),
    /// Scaling transitions out of order.
    #[error("scaling order violated: fragment is {found}, operation requires {expected}")]
    ScalingOrder {
        expected: &'static str,
        found: &'static str,
    },
    /// Bounding box too small (or empty) to build a reference frame.
    #[error("degenerate bounding box (extent {0})")]
    DegenerateBoundingBox(f64),
    /// Input mesh failed a structural precondition.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Partitioning request could not be satisfied.
    #[error("partition error: {0}")]
    Partition(String),
    /// Fragments could not be reconciled into one mesh.
    #[error("merge inconsistency: {0}")]
    MergeInconsistency(String),
    /// A wire buffer could not be decoded.
    #[error("wire error: {0}")]
    Wire(String),
    /// Message passing failed.
    #[error(transparent)]
    Comm(#[from] CommError),
    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Config(String),
    /// Filesystem access failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A persisted document could not be (de)serialized.
    #[error("serialization error on {}: {message}", path.display())]
    Serialization { path: PathBuf, message: String },
}

impl MeshAdaptError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshAdaptError::Io {
            path: path.into(),
            source,
        }
    }
}
