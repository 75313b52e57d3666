//! Mesh scaling into a unit reference frame.
//!
//! Coordinates are mapped with `x' = (x - origin) / delta` where `origin` is
//! the lower corner of the bounding box and `delta` its largest extent. The
//! attached solution follows the geometry: isotropic sizes are divided by
//! `delta`, anisotropic metrics (which scale like `1/h²`) are multiplied by
//! `delta²`. Unscaling applies the exact inverse.
//!
//! A fragment moves strictly `Unscaled → Scaled → Unscaled`; any other
//! transition is rejected with [`MeshAdaptError::ScalingOrder`].

use crate::data::fragment::MeshFragment;
use crate::mesh_error::MeshAdaptError;

/// Extents below this are treated as a degenerate box.
pub const MIN_EXTENT: f64 = 1e-30;

/// Affine map between physical and reference coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalingFrame {
    pub origin: [f64; 3],
    pub delta: f64,
}

impl ScalingFrame {
    #[inline]
    pub fn to_reference(&self, x: [f64; 3]) -> [f64; 3] {
        let dd = 1.0 / self.delta;
        [
            dd * (x[0] - self.origin[0]),
            dd * (x[1] - self.origin[1]),
            dd * (x[2] - self.origin[2]),
        ]
    }

    #[inline]
    pub fn to_physical(&self, x: [f64; 3]) -> [f64; 3] {
        [
            self.delta * x[0] + self.origin[0],
            self.delta * x[1] + self.origin[1],
            self.delta * x[2] + self.origin[2],
        ]
    }
}

/// Scaling state of a fragment.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ScalingState {
    #[default]
    Unscaled,
    Scaled(ScalingFrame),
}

impl ScalingState {
    #[inline]
    pub fn is_scaled(&self) -> bool {
        matches!(self, ScalingState::Scaled(_))
    }

    pub fn frame(&self) -> Option<ScalingFrame> {
        match self {
            ScalingState::Scaled(f) => Some(*f),
            ScalingState::Unscaled => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ScalingState::Unscaled => "unscaled",
            ScalingState::Scaled(_) => "scaled",
        }
    }
}

/// Axis-aligned bounding box; empty until a point is included.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn include(&mut self, x: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(x[i]);
            self.max[i] = self.max[i].max(x[i]);
        }
    }

    pub fn union(mut self, other: &BoundingBox) -> BoundingBox {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
        self
    }

    pub fn of(fragment: &MeshFragment) -> BoundingBox {
        let mut bb = BoundingBox::empty();
        for v in fragment.vertices.values() {
            bb.include(v.coords);
        }
        bb
    }

    /// Reference frame spanning this box.
    pub fn frame(&self) -> Result<ScalingFrame, MeshAdaptError> {
        if self.is_empty() {
            return Err(MeshAdaptError::DegenerateBoundingBox(0.0));
        }
        let delta = (0..3)
            .map(|i| self.max[i] - self.min[i])
            .fold(0.0_f64, f64::max);
        if !delta.is_finite() || delta < MIN_EXTENT {
            return Err(MeshAdaptError::DegenerateBoundingBox(delta));
        }
        Ok(ScalingFrame {
            origin: self.min,
            delta,
        })
    }
}

/// Bring `fragment` into the reference frame `frame`.
///
/// Nothing is modified when an error is returned.
pub fn scale_fragment(
    fragment: &mut MeshFragment,
    frame: ScalingFrame,
) -> Result<(), MeshAdaptError> {
    if fragment.scaling().is_scaled() {
        return Err(MeshAdaptError::ScalingOrder {
            expected: "unscaled",
            found: fragment.scaling().label(),
        });
    }
    if !frame.delta.is_finite() || frame.delta < MIN_EXTENT {
        return Err(MeshAdaptError::DegenerateBoundingBox(frame.delta));
    }
    for v in fragment.vertices.values_mut() {
        v.coords = frame.to_reference(v.coords);
    }
    if let Some(sol) = fragment.solution.as_mut() {
        let factor = if sol.is_isotropic() {
            1.0 / frame.delta
        } else {
            frame.delta * frame.delta
        };
        for vals in sol.values_mut() {
            vals.iter_mut().for_each(|m| *m *= factor);
        }
    }
    fragment.set_scaling(ScalingState::Scaled(frame));
    log::debug!(
        "scaled {} vertices (delta = {:e})",
        fragment.n_vertices(),
        frame.delta
    );
    Ok(())
}

/// Return `fragment` to physical coordinates.
///
/// Fails if the fragment is not scaled, or if any coordinate or solution
/// value comes back non-finite; the geometry is then in an indeterminate
/// frame and must not be written.
pub fn unscale_fragment(fragment: &mut MeshFragment) -> Result<(), MeshAdaptError> {
    let frame = fragment
        .scaling()
        .frame()
        .ok_or(MeshAdaptError::ScalingOrder {
            expected: "scaled",
            found: "unscaled",
        })?;
    for (id, v) in fragment.vertices.iter_mut() {
        v.coords = frame.to_physical(v.coords);
        if v.coords.iter().any(|c| !c.is_finite()) {
            return Err(MeshAdaptError::InvalidGeometry(format!(
                "vertex {id} has non-finite coordinates after unscaling"
            )));
        }
    }
    if let Some(sol) = fragment.solution.as_mut() {
        let factor = if sol.is_isotropic() {
            frame.delta
        } else {
            1.0 / (frame.delta * frame.delta)
        };
        for vals in sol.values_mut() {
            for m in vals.iter_mut() {
                *m *= factor;
                if !m.is_finite() {
                    return Err(MeshAdaptError::InvalidGeometry(
                        "non-finite solution value after unscaling".into(),
                    ));
                }
            }
        }
    }
    fragment.set_scaling(ScalingState::Unscaled);
    Ok(())
}
