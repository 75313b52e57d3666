//! Run orchestration: configuration, phases, classification and the
//! controller that ties the components together.

pub mod classify;
pub mod config;
pub mod context;
pub mod controller;
pub mod phase;
pub mod preprocess;

pub use classify::{FailureKind, classify};
pub use config::{Rebalance, RunConfig};
pub use context::{ROOT, RunContext};
pub use controller::{RunController, RunReport};
pub use phase::{Phase, PhaseStatus, RunOutcome};
