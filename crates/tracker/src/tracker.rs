//! Top-level coordinator.
//!
//! Owns the child-list engine and the property cache and answers the five
//! questions about the tracked tree: is anything different, where are the
//! differences, what is the per-node delta, how to patch a tree into the
//! mutated configuration, and how to restore the original one. The live
//! tree is always passed in by the caller; the tracker keeps no reference
//! to it.

use std::collections::{HashMap, HashSet};

use dom::{Boundary, BoundaryRange, Dom, DomError, NodeId};

use crate::children::ChildTracker;
use crate::filter::DiffFilter;
use crate::groups::{GroupIter, patch_grouped_children};
use crate::position::{Dimension, Position, Sibling};
use crate::properties::{NativeKey, PropertyTracker};

/// Materialized copy of one node's delta. Sibling slots never expose a
/// parked search; an unresolved slot reads as [`Sibling::Unknown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeDelta {
    pub original: Option<Position>,
    pub mutated: Option<Position>,
    /// Attribute name to original value (`None` = attribute was absent).
    pub attributes: HashMap<String, Option<String>>,
    /// Original character data, when it changed.
    pub data: Option<Option<String>>,
    pub custom: HashMap<String, Option<String>>,
}

impl NodeDelta {
    fn is_empty(&self) -> bool {
        self.original.is_none()
            && self.mutated.is_none()
            && self.attributes.is_empty()
            && self.data.is_none()
            && self.custom.is_empty()
    }
}

#[derive(Debug)]
pub enum RangeError {
    /// `range()` was called without a root while changes span more than one
    /// tree.
    DisconnectedRoots,
}

#[derive(Debug, Default)]
pub struct MutationTracker {
    children: ChildTracker,
    properties: PropertyTracker,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One child-list report: inside `parent` the contiguous run
    /// `[prev, ...removed, next]` became `[prev, ...added, next]`. The five
    /// arguments must describe one consistent point in time.
    pub fn record_children(
        &mut self,
        parent: NodeId,
        removed: &[NodeId],
        added: &[NodeId],
        prev: Option<NodeId>,
        next: Option<NodeId>,
    ) {
        self.children.apply(parent, removed, added, prev, next);
    }

    /// An attribute report. `old_value` is the value before the change
    /// (`Some(None)` when the attribute was absent); a report without an old
    /// value is ignored, no dirty flag can be computed from it. The current
    /// value is read from the live tree.
    pub fn record_attribute(
        &mut self,
        dom: &Dom,
        node: NodeId,
        key: &str,
        old_value: Option<Option<&str>>,
    ) {
        let Some(old) = old_value else {
            return;
        };
        let new = dom.attr(node, key);
        self.properties
            .mark_native(node, NativeKey::Attribute(key.to_string()), new, old);
    }

    /// A character-data report; same old-value contract as attributes.
    pub fn record_data(&mut self, dom: &Dom, node: NodeId, old_value: Option<&str>) {
        let Some(old) = old_value else {
            return;
        };
        let new = dom.text(node);
        self.properties.mark_native(node, NativeKey::Data, new, Some(old));
    }

    /// A caller-defined property report; both values come from the caller.
    pub fn record_custom(
        &mut self,
        node: NodeId,
        key: &str,
        new_value: Option<&str>,
        old_value: Option<&str>,
    ) {
        self.properties.mark_custom(node, key, new_value, old_value);
    }

    /// Is anything different from the original? With a root, only changes
    /// whose original or current parent lies inside it count.
    pub fn mutated(&self, dom: &Dom, root: Option<NodeId>) -> bool {
        let Some(root) = root else {
            return !self.children.is_empty() || self.properties.is_dirty();
        };
        for id in self.children.sorted_ids() {
            for dim in [Dimension::Original, Dimension::Mutated] {
                if let Some(pos) = self.children.position_of(id, dim)
                    && dom.contains(root, pos.parent)
                {
                    return true;
                }
            }
        }
        self.properties
            .dirty_nodes()
            .iter()
            .any(|n| dom.contains(root, *n))
    }

    /// Finalizes all outstanding unknowns against the live tree. Call once
    /// every pending observation has been delivered.
    pub fn synchronize(&mut self, dom: &Dom) {
        self.children.synchronize(dom);
        let dirty = self.properties.synchronize();
        log::trace!(
            target: "tracker",
            "synchronize: {} tracked node(s), {dirty} dirty propert(ies)",
            self.children.tracked_count()
        );
    }

    pub fn clear(&mut self) {
        self.children.clear();
        self.properties.clear();
    }

    /// Materializes a copy of the current delta, filtered by `filter`.
    pub fn diff(&self, filter: DiffFilter) -> HashMap<NodeId, NodeDelta> {
        let mut out: HashMap<NodeId, NodeDelta> = HashMap::new();
        if filter.intersects(DiffFilter::CHILDREN) {
            for id in self.children.sorted_ids() {
                let mut delta = NodeDelta::default();
                if filter.contains(DiffFilter::ORIGINAL) {
                    delta.original = self
                        .children
                        .position_of(id, Dimension::Original)
                        .map(scrub_position);
                }
                if filter.contains(DiffFilter::MUTATED) {
                    delta.mutated = self
                        .children
                        .position_of(id, Dimension::Mutated)
                        .map(scrub_position);
                }
                if !delta.is_empty() {
                    out.insert(id, delta);
                }
            }
        }
        if filter.intersects(DiffFilter::PROPERTY) {
            for node in self.properties.dirty_nodes() {
                let delta = out.entry(node).or_default();
                for (key, value) in self.properties.dirty_natives(node) {
                    match key {
                        NativeKey::Data if filter.contains(DiffFilter::DATA) => {
                            delta.data = Some(value.map(str::to_string));
                        }
                        NativeKey::Attribute(name) if filter.contains(DiffFilter::ATTRIBUTE) => {
                            delta
                                .attributes
                                .insert(name.clone(), value.map(str::to_string));
                        }
                        _ => {}
                    }
                }
                if filter.contains(DiffFilter::CUSTOM) {
                    for (key, value) in self.properties.dirty_customs(node) {
                        delta.custom.insert(key.to_string(), value.map(str::to_string));
                    }
                }
                if out.get(&node).is_some_and(NodeDelta::is_empty) {
                    out.remove(&node);
                }
            }
        }
        out
    }

    /// Lazy iteration of the current delta as contiguous child groups.
    pub fn grouped_children(&self, mode: Dimension, include_removed: bool) -> GroupIter<'_> {
        GroupIter::new(&self.children, mode, include_removed)
    }

    /// Restores the tree to its original configuration: properties first,
    /// then the child lists, then the tracker forgets everything.
    pub fn revert(
        &mut self,
        dom: &mut Dom,
        custom_set: Option<&mut dyn FnMut(NodeId, &str, Option<&str>)>,
    ) -> Result<(), DomError> {
        self.properties.revert_all(dom, custom_set)?;
        let groups: Vec<_> = self
            .grouped_children(Dimension::Original, true)
            .collect();
        patch_grouped_children(dom, groups)?;
        self.clear();
        Ok(())
    }

    /// Inclusive outer bounds of every change, exclusive-normalized. With no
    /// root, fails when contributions span disconnected trees; contributions
    /// anchored in detached space are skipped either way.
    pub fn range(
        &self,
        dom: &Dom,
        root: Option<NodeId>,
    ) -> Result<Option<BoundaryRange>, RangeError> {
        let mut fr = BoundaryRange::null();
        let mut seen_top: Option<NodeId> = None;
        let mut admit = |dom: &Dom, anchor: NodeId| -> Result<bool, RangeError> {
            match root {
                Some(r) => Ok(dom.contains(r, anchor)),
                None => {
                    // orphaned space: an anchor with no parent has nothing
                    // around it to cover and names no principal tree
                    if dom.parent(anchor).is_none() {
                        return Ok(false);
                    }
                    let top = dom.top(anchor);
                    match seen_top {
                        None => {
                            seen_top = Some(top);
                            Ok(true)
                        }
                        Some(t) if t == top => Ok(true),
                        Some(_) => Err(RangeError::DisconnectedRoots),
                    }
                }
            }
        };

        let dirty_nodes = self.properties.dirty_nodes();
        let dirty_set: HashSet<NodeId> = dirty_nodes.iter().copied().collect();
        for &node in &dirty_nodes {
            if dom.parent(node).is_none() {
                continue;
            }
            if admit(dom, node)? {
                fr.extend(dom, &BoundaryRange::select_node(node));
            }
        }
        for id in self.children.sorted_ids() {
            if dom.parent(id).is_some() && !dirty_set.contains(&id) && admit(dom, id)? {
                fr.extend(dom, &BoundaryRange::select_node(id));
            }
            let Some(o) = self.children.position_of(id, Dimension::Original) else {
                continue;
            };
            let prev_settled = self.settled(o.prev);
            let next_settled = self.settled(o.next);
            if !prev_settled && !next_settled {
                // a neighbouring record's settled chain covers this gap
                continue;
            }
            if !admit(dom, o.parent)? {
                continue;
            }
            let start = match o.prev {
                Sibling::Edge => (o.parent, Boundary::AfterOpen),
                Sibling::Node(h) => (h, Boundary::AfterClose),
                _ => (o.parent, Boundary::AfterOpen),
            };
            let end = match o.next {
                Sibling::Edge => (o.parent, Boundary::BeforeClose),
                Sibling::Node(h) => (h, Boundary::BeforeOpen),
                _ => (o.parent, Boundary::BeforeClose),
            };
            let mut sr = BoundaryRange::null();
            if prev_settled {
                sr.set_start(start.0, start.1);
                if !next_settled {
                    sr.collapse(true);
                } else {
                    sr.set_end(end.0, end.1);
                }
            } else {
                sr.set_end(end.0, end.1);
                sr.collapse(false);
            }
            fr.extend(dom, &sr);
        }

        if fr.is_null() {
            return Ok(None);
        }
        fr.normalize(dom);
        Ok(Some(fr))
    }

    /// An original sibling is settled once it is known and not itself still
    /// floating.
    fn settled(&self, sibling: Sibling) -> bool {
        match sibling {
            Sibling::Edge => true,
            Sibling::Node(h) => !self.children.is_tracked(h),
            Sibling::Unknown | Sibling::Pending(_) => false,
        }
    }
}

fn scrub_position(pos: Position) -> Position {
    let scrub = |s: Sibling| match s {
        Sibling::Pending(_) => Sibling::Unknown,
        other => other,
    };
    Position::new(pos.parent, scrub(pos.prev), scrub(pos.next))
}
