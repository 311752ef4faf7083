//! Incremental mutation tracking for live trees.
//!
//! Feeds on batched child-list, attribute and character-data reports from an
//! external observer and maintains, in minimal delta form, the difference
//! between a tree's state at an initial observation point and its current
//! state. The hard part is the child-list graph: reports arrive after the
//! fact, sibling identities in them may already be stale, nodes can surface
//! out of unwatched subtrees with unknown neighbours, and a chain of moves
//! may net out to no move at all. Deferred sibling searches and reversion
//! propagation keep the ledger tight: a node carries a record exactly while
//! it is away from its original position.

pub mod driver;
pub mod groups;

mod children;
mod filter;
mod index;
mod position;
mod promise;
mod properties;
mod record;
mod tracker;

pub use crate::filter::DiffFilter;
pub use crate::groups::{ChildGroup, GroupAnchor, GroupIter, patch_grouped_children};
pub use crate::position::{Dimension, Position, PromiseId, Side, Sibling};
pub use crate::tracker::{MutationTracker, NodeDelta, RangeError};
