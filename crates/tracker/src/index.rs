//! Secondary lookup maps over the record ledger.
//!
//! For each dimension and side, maps a sibling handle to the record whose
//! slot carries it: `owner(Prev, x)` is the record with `prev == x` (the node
//! sitting right after `x`), `owner(Next, x)` the record with `next == x`.
//! Only handle-valued slots are indexed, and at most one record owns each
//! (side, handle) key. Two records can still race for a key when a move
//! happened outside any watched subtree and the old owner's report never
//! arrived; the writer then takes the key over through `evict`, and the
//! engine invalidates the displaced owner's slot so index and slots never
//! disagree.

use std::collections::HashMap;

use dom::NodeId;

use crate::position::{Dimension, Side, Sibling};

#[derive(Debug, Default)]
pub(crate) struct SideIndex {
    by_prev: HashMap<NodeId, NodeId>,
    by_next: HashMap<NodeId, NodeId>,
}

impl SideIndex {
    fn map(&self, side: Side) -> &HashMap<NodeId, NodeId> {
        match side {
            Side::Prev => &self.by_prev,
            Side::Next => &self.by_next,
        }
    }

    fn map_mut(&mut self, side: Side) -> &mut HashMap<NodeId, NodeId> {
        match side {
            Side::Prev => &mut self.by_prev,
            Side::Next => &mut self.by_next,
        }
    }

    pub fn owner(&self, side: Side, sibling: NodeId) -> Option<NodeId> {
        self.map(side).get(&sibling).copied()
    }

    /// Removes and returns the current owner of `(side, sibling)`, if any.
    /// Called before a different record claims the key; the caller must
    /// invalidate the displaced owner's slot, which now carries stale
    /// knowledge.
    pub fn evict(&mut self, side: Side, sibling: NodeId) -> Option<NodeId> {
        self.map_mut(side).remove(&sibling)
    }

    /// Replaces `owner`'s entry for `side` when its slot changes from `old`
    /// to `new`. Disconnect-by-overwrite: writing the new value is what
    /// removes the old entry.
    pub fn rewrite(&mut self, side: Side, old: Sibling, new: Sibling, owner: NodeId) {
        if let Sibling::Node(x) = old {
            let map = self.map_mut(side);
            if map.get(&x) == Some(&owner) {
                map.remove(&x);
            }
        }
        if let Sibling::Node(x) = new {
            self.map_mut(side).insert(x, owner);
        }
    }

    pub fn clear(&mut self) {
        self.by_prev.clear();
        self.by_next.clear();
    }

    #[cfg(debug_assertions)]
    pub fn entries(&self, side: Side) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.map(side).iter().map(|(k, v)| (*k, *v))
    }
}

#[derive(Debug, Default)]
pub(crate) struct SiblingIndexes {
    original: SideIndex,
    mutated: SideIndex,
}

impl SiblingIndexes {
    pub fn dim(&self, dim: Dimension) -> &SideIndex {
        match dim {
            Dimension::Original => &self.original,
            Dimension::Mutated => &self.mutated,
        }
    }

    pub fn dim_mut(&mut self, dim: Dimension) -> &mut SideIndex {
        match dim {
            Dimension::Original => &mut self.original,
            Dimension::Mutated => &mut self.mutated,
        }
    }

    pub fn original(&self) -> &SideIndex {
        self.dim(Dimension::Original)
    }

    pub fn mutated(&self) -> &SideIndex {
        self.dim(Dimension::Mutated)
    }

    pub fn clear(&mut self) {
        self.original.clear();
        self.mutated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_moves_ownership() {
        let mut index = SideIndex::default();
        let owner = NodeId(1);
        index.rewrite(Side::Prev, Sibling::Unknown, Sibling::Node(NodeId(7)), owner);
        assert_eq!(index.owner(Side::Prev, NodeId(7)), Some(owner));
        index.rewrite(Side::Prev, Sibling::Node(NodeId(7)), Sibling::Edge, owner);
        assert_eq!(index.owner(Side::Prev, NodeId(7)), None);
    }

    #[test]
    fn rewrite_does_not_drop_a_newer_owner() {
        let mut index = SideIndex::default();
        index.rewrite(Side::Next, Sibling::Unknown, Sibling::Node(NodeId(7)), NodeId(1));
        index.rewrite(Side::Next, Sibling::Unknown, Sibling::Node(NodeId(7)), NodeId(2));
        // The stale owner clearing its slot must not erase the new claim.
        index.rewrite(Side::Next, Sibling::Node(NodeId(7)), Sibling::Unknown, NodeId(1));
        assert_eq!(index.owner(Side::Next, NodeId(7)), Some(NodeId(2)));
    }

    #[test]
    fn evict_hands_the_key_to_a_new_claimant() {
        let mut index = SideIndex::default();
        index.rewrite(Side::Prev, Sibling::Unknown, Sibling::Node(NodeId(7)), NodeId(1));
        assert_eq!(index.evict(Side::Prev, NodeId(7)), Some(NodeId(1)));
        assert_eq!(index.owner(Side::Prev, NodeId(7)), None);
        assert_eq!(index.evict(Side::Prev, NodeId(7)), None);
    }
}
