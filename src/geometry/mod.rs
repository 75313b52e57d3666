//! Geometry helpers: unit-frame scaling and element quality diagnostics.

pub mod quality;
pub mod scaling;
