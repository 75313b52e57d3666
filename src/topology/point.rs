//! `PointId`: a strong, zero-cost handle for mesh entities
//!
//! Every vertex and tetrahedron of a fragment is addressed by a `PointId`
//! wrapping a nonzero `u64`; 0 is reserved as an invalid sentinel. Ids are
//! global across the process group until the merge renumbers them.

use crate::mesh_error::MeshAdaptError;
use std::{fmt, num::NonZeroU64};

/// Opaque, nonzero identifier of a vertex or element.
///
/// This type is `repr(transparent)` so it has the same layout as `u64` and
/// can travel on the wire (and over MPI) as one.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PointId(NonZeroU64);

impl PointId {
    /// Creates a new `PointId` from a raw `u64` value.
    ///
    /// Returns [`MeshAdaptError::InvalidPointId`] if `raw == 0`.
    ///
    /// ```rust
    /// # use mesh_adapt_run::topology::point::PointId;
    /// let p = PointId::new(1)?;
    /// assert_eq!(p.get(), 1);
    /// # Ok::<(), mesh_adapt_run::mesh_error::MeshAdaptError>(())
    /// ```
    #[inline]
    pub fn new(raw: u64) -> Result<Self, MeshAdaptError> {
        NonZeroU64::new(raw)
            .map(PointId)
            .ok_or(MeshAdaptError::InvalidPointId)
    }

    /// Returns the inner `u64` value of this `PointId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The id immediately after this one.
    #[inline]
    pub fn next(self) -> Result<Self, MeshAdaptError> {
        let raw = self
            .get()
            .checked_add(1)
            .ok_or(MeshAdaptError::InvalidPointId)?;
        PointId::new(raw)
    }
}

// -----------------------------------------------------------------------------
// Formatting traits
// -----------------------------------------------------------------------------

impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PointId").field(&self.get()).finish()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

// -----------------------------------------------------------------------------
// FFI and layout guarantees
// -----------------------------------------------------------------------------

/// `PointId` has the same MPI datatype as `u64`.
#[cfg(feature = "mpi-support")]
unsafe impl mpi::datatype::Equivalence for PointId {
    type Out = <u64 as mpi::datatype::Equivalence>::Out;

    fn equivalent_datatype() -> Self::Out {
        u64::equivalent_datatype()
    }
}
