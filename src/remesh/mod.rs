//! The remeshing collaborator.
//!
//! An engine adapts one scaled fragment in place. Vertices listed in the
//! fragment's interface are frozen: they must keep their ids and coordinates
//! so the fragments can be merged afterwards. New vertices and elements take
//! ids from [`MeshFragment::fresh_vertex_id`] and
//! [`MeshFragment::fresh_element_id`].

use crate::data::fragment::MeshFragment;
use crate::run::context::RunContext;
use crate::topology::point::PointId;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// How badly an adaptation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemeshSeverity {
    /// The fragment is still a valid, conformal mesh; the run can continue
    /// towards output.
    Recoverable,
    /// The fragment is no longer conformal; no trustworthy mesh exists.
    Fatal,
}

impl fmt::Display for RemeshSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemeshSeverity::Recoverable => "recoverable",
            RemeshSeverity::Fatal => "fatal",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{severity} remesh failure: {message}")]
pub struct RemeshError {
    pub severity: RemeshSeverity,
    pub message: String,
}

impl RemeshError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            severity: RemeshSeverity::Recoverable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            severity: RemeshSeverity::Fatal,
            message: message.into(),
        }
    }
}

/// Parallel adaptive remesher, invoked once per process per run.
pub trait RemeshEngine {
    fn adapt(&mut self, fragment: &mut MeshFragment, ctx: &RunContext) -> Result<(), RemeshError>;
}

/// Engine that leaves every fragment unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityRemesher;

impl RemeshEngine for IdentityRemesher {
    fn adapt(&mut self, _fragment: &mut MeshFragment, _ctx: &RunContext) -> Result<(), RemeshError> {
        Ok(())
    }
}

/// Coordinates of the frozen interface vertices, taken before adaptation.
#[derive(Clone, Debug, Default)]
pub struct FrozenInterface(BTreeMap<PointId, [f64; 3]>);

impl FrozenInterface {
    pub fn capture(fragment: &MeshFragment) -> Self {
        Self(
            fragment
                .interface
                .keys()
                .filter_map(|&v| fragment.vertices.get(&v).map(|x| (v, x.coords)))
                .collect(),
        )
    }

    /// Check that the engine left every interface vertex in place.
    ///
    /// A moved or deleted interface vertex breaks conformity with the
    /// neighbouring fragments and is reported as a fatal failure.
    pub fn verify(&self, fragment: &MeshFragment) -> Result<(), RemeshError> {
        for (v, coords) in &self.0 {
            match fragment.vertices.get(v) {
                Some(x) if x.coords == *coords && fragment.is_shared(*v) => {}
                Some(_) => {
                    return Err(RemeshError::fatal(format!(
                        "interface vertex {v} was modified"
                    )));
                }
                None => {
                    return Err(RemeshError::fatal(format!(
                        "interface vertex {v} was removed"
                    )));
                }
            }
        }
        Ok(())
    }
}
