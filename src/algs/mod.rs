//! Distributed algorithms: communication, partitioning, distribution and
//! merging of mesh fragments.

pub mod collective;
pub mod communicator;
pub mod distribute;
pub mod dual_graph;
pub mod merge;
pub mod meshgen;
pub mod partition;
pub mod wire;

pub use communicator::{Communicator, LocalComm, NoComm};
pub use distribute::{distribute, redistribute};
pub use merge::{merge_fragments, merge_on_target};
pub use partition::{PartitionMap, partition_elements};
