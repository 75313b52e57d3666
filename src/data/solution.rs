//! Per-vertex solution fields carried alongside a fragment.
//!
//! A field is either an isotropic size map (one value per vertex) or an
//! anisotropic metric (six values per vertex: the upper triangle
//! `m11 m12 m13 m22 m23 m33` of a symmetric tensor).

use crate::mesh_error::MeshAdaptError;
use crate::topology::point::PointId;
use std::collections::BTreeMap;

/// Components per vertex of an isotropic size map.
pub const ISOTROPIC: usize = 1;
/// Components per vertex of an anisotropic metric.
pub const ANISOTROPIC: usize = 6;

/// Solution values keyed by vertex.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolutionField {
    size: usize,
    values: BTreeMap<PointId, Vec<f64>>,
}

impl SolutionField {
    /// Create an empty field with `size` components per vertex.
    pub fn new(size: usize) -> Result<Self, MeshAdaptError> {
        if size != ISOTROPIC && size != ANISOTROPIC {
            return Err(MeshAdaptError::UnsupportedSolutionSize(size));
        }
        Ok(Self {
            size,
            values: BTreeMap::new(),
        })
    }

    /// Components per vertex.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_isotropic(&self) -> bool {
        self.size == ISOTROPIC
    }

    /// Number of vertices carrying a value.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set the values of `vertex`, checking the component count.
    pub fn set(&mut self, vertex: PointId, values: &[f64]) -> Result<(), MeshAdaptError> {
        if values.len() != self.size {
            return Err(MeshAdaptError::SolutionLength {
                expected: self.size,
                found: values.len(),
            });
        }
        self.values.insert(vertex, values.to_vec());
        Ok(())
    }

    pub fn get(&self, vertex: PointId) -> Option<&[f64]> {
        self.values.get(&vertex).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, vertex: PointId) -> Option<&mut [f64]> {
        self.values.get_mut(&vertex).map(Vec::as_mut_slice)
    }

    pub fn remove(&mut self, vertex: PointId) -> Option<Vec<f64>> {
        self.values.remove(&vertex)
    }

    /// Iterate `(vertex, values)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &[f64])> + '_ {
        self.values.iter().map(|(&p, v)| (p, v.as_slice()))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut [f64]> + '_ {
        self.values.values_mut().map(Vec::as_mut_slice)
    }

    /// Copy of this field restricted to `keep`.
    pub fn restricted<'a>(&self, keep: impl IntoIterator<Item = &'a PointId>) -> Self {
        let mut out = Self {
            size: self.size,
            values: BTreeMap::new(),
        };
        for p in keep {
            if let Some(v) = self.values.get(p) {
                out.values.insert(*p, v.clone());
            }
        }
        out
    }

    /// Clamp every isotropic size into `[hmin, hmax]`; anisotropic fields are
    /// left untouched.
    pub fn truncate(&mut self, hmin: f64, hmax: f64) {
        if !self.is_isotropic() {
            return;
        }
        for v in self.values.values_mut() {
            v[0] = v[0].clamp(hmin, hmax);
        }
    }
}
