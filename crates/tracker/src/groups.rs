//! Grouped-children iteration and patching.
//!
//! A group is a maximal run of tracked nodes that are adjacent in the
//! requested dimension, together with the settled boundaries either side.
//! `patch_grouped_children` replays groups onto a tree: everything detaches
//! first, then each group is inserted at its boundary, which sidesteps
//! ordering hazards when a node migrated between ancestor and descendant.

use std::collections::HashSet;

use dom::{Dom, DomError, NodeId};

use crate::children::ChildTracker;
use crate::position::{Dimension, Sibling, Side};

/// A settled group boundary: a node that is not itself tracked, or the edge
/// of the parent's child list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupAnchor {
    Edge,
    Node(NodeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildGroup {
    /// Tracked nodes in child-list order.
    pub nodes: Vec<NodeId>,
    /// `None` for the trailing group of nodes with no position in the
    /// requested dimension.
    pub parent: Option<NodeId>,
    /// `None` when the boundary never became known (untracked insertion).
    pub prev: Option<GroupAnchor>,
    pub next: Option<GroupAnchor>,
}

pub struct GroupIter<'a> {
    engine: &'a ChildTracker,
    mode: Dimension,
    include_removed: bool,
    ids: Vec<NodeId>,
    at: usize,
    visited: HashSet<NodeId>,
    removed: Vec<NodeId>,
    removed_emitted: bool,
}

impl<'a> GroupIter<'a> {
    pub(crate) fn new(engine: &'a ChildTracker, mode: Dimension, include_removed: bool) -> Self {
        Self {
            engine,
            mode,
            include_removed,
            ids: engine.sorted_ids(),
            at: 0,
            visited: HashSet::new(),
            removed: Vec::new(),
            removed_emitted: false,
        }
    }

    /// Walks the chain from `seed` toward `side`, pushing members onto
    /// `nodes` and returning the boundary (None when it never became known).
    fn walk(
        &mut self,
        parent: NodeId,
        seed: Sibling,
        side: Side,
        nodes: &mut Vec<NodeId>,
    ) -> Option<GroupAnchor> {
        let mut cur = seed;
        loop {
            match cur {
                Sibling::Edge => return Some(GroupAnchor::Edge),
                Sibling::Unknown | Sibling::Pending(_) => return None,
                Sibling::Node(h) => {
                    if !self.engine.is_tracked(h) {
                        return Some(GroupAnchor::Node(h));
                    }
                    match self.engine.position_of(h, self.mode) {
                        Some(pos) if pos.parent == parent && self.visited.insert(h) => {
                            nodes.push(h);
                            cur = pos.side(side);
                        }
                        _ => return None,
                    }
                }
            }
        }
    }
}

impl Iterator for GroupIter<'_> {
    type Item = ChildGroup;

    fn next(&mut self) -> Option<ChildGroup> {
        while self.at < self.ids.len() {
            let id = self.ids[self.at];
            self.at += 1;
            if self.visited.contains(&id) {
                continue;
            }
            let Some(pos) = self.engine.position_of(id, self.mode) else {
                self.visited.insert(id);
                if self.include_removed {
                    self.removed.push(id);
                }
                continue;
            };
            self.visited.insert(id);
            let mut left = Vec::new();
            let prev = self.walk(pos.parent, pos.prev, Side::Prev, &mut left);
            let mut nodes: Vec<NodeId> = left.into_iter().rev().collect();
            nodes.push(id);
            let next = self.walk(pos.parent, pos.next, Side::Next, &mut nodes);
            return Some(ChildGroup {
                nodes,
                parent: Some(pos.parent),
                prev,
                next,
            });
        }
        if self.include_removed && !self.removed_emitted {
            self.removed_emitted = true;
            if !self.removed.is_empty() {
                return Some(ChildGroup {
                    nodes: std::mem::take(&mut self.removed),
                    parent: None,
                    prev: None,
                    next: None,
                });
            }
        }
        None
    }
}

/// Replays `groups` onto `dom`. A pure function of the caller's tree: every
/// grouped node is detached first, then each group is inserted at its
/// boundary. A group whose boundaries never became known is skipped with a
/// warning; the damage stays local to that group.
pub fn patch_grouped_children<I>(dom: &mut Dom, groups: I) -> Result<(), DomError>
where
    I: IntoIterator<Item = ChildGroup>,
{
    let groups: Vec<ChildGroup> = groups.into_iter().collect();
    for group in &groups {
        for &node in &group.nodes {
            if dom.parent(node).is_some() {
                dom.remove(node)?;
            }
        }
    }
    for group in &groups {
        let Some(parent) = group.parent else {
            continue;
        };
        match (group.prev, group.next) {
            (_, Some(GroupAnchor::Node(next))) => {
                for &node in &group.nodes {
                    dom.insert_before(next, node)?;
                }
            }
            (_, Some(GroupAnchor::Edge)) => {
                for &node in &group.nodes {
                    dom.append(parent, node)?;
                }
            }
            (Some(GroupAnchor::Node(prev)), None) => {
                let mut cursor = prev;
                for &node in &group.nodes {
                    dom.insert_after(cursor, node)?;
                    cursor = node;
                }
            }
            (Some(GroupAnchor::Edge), None) => {
                let mut cursor = None;
                for &node in &group.nodes {
                    match cursor {
                        None => dom.prepend(parent, node)?,
                        Some(c) => dom.insert_after(c, node)?,
                    }
                    cursor = Some(node);
                }
            }
            (None, None) => {
                log::warn!(
                    target: "tracker.patch",
                    "group of {} node(s) under {parent:?} has no usable boundary; skipped",
                    group.nodes.len()
                );
            }
        }
    }
    Ok(())
}
