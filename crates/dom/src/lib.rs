pub mod range;
pub mod snapshot;

mod tree;

pub use crate::range::{Boundary, BoundaryPoint, BoundaryRange, compare_points};
pub use crate::snapshot::{SnapshotOptions, TreeSnapshot, assert_tree_eq, compare_snapshots};
pub use crate::tree::{Dom, DomError, NodeData, NodeId, RawId};
