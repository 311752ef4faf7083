//! Child-list mutation engine.
//!
//! Contract:
//! - `apply` consumes one point-in-time report: inside `parent` the
//!   contiguous run `[prev, ...removed, next]` became `[prev, ...added, next]`.
//! - A record exists for a node exactly while its position differs from the
//!   original one; a node whose mutations cancel out is pruned.
//! - Sibling knowledge arrives piecemeal; unknown slots hold `Unknown` or a
//!   parked search and are only trusted once revealed by a report or by
//!   `synchronize`, which reads the live tree.
//! - After every public call the record ledger, both sibling indexes and the
//!   promise table are mutually consistent (checked in debug builds).

use std::collections::{HashMap, HashSet};

use dom::{Dom, NodeId};

use crate::index::SiblingIndexes;
use crate::position::{Dimension, Position, PromiseId, Side, Sibling};
use crate::promise::PromiseTable;
use crate::record::MovedNode;

const DEAD_PREV: u8 = 1;
const DEAD_NEXT: u8 = 2;

/// Per-call memo of reversion sides already known not to match, so
/// overlapping checks within one report do not retry them.
type DeadSides = HashMap<NodeId, u8>;

#[derive(Debug, Default)]
pub(crate) struct ChildTracker {
    records: HashMap<NodeId, MovedNode>,
    index: SiblingIndexes,
    promises: PromiseTable,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_tracked(&self, node: NodeId) -> bool {
        self.records.contains_key(&node)
    }

    pub fn position_of(&self, node: NodeId, dim: Dimension) -> Option<Position> {
        self.records.get(&node).and_then(|rec| rec.position(dim))
    }

    pub fn sorted_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.promises.clear();
    }

    // ---- slot plumbing -----------------------------------------------------

    fn slot(&self, node: NodeId, dim: Dimension, side: Side) -> Option<Sibling> {
        self.position_of(node, dim).map(|pos| pos.side(side))
    }

    /// Writes one slot, keeping the sibling index in step
    /// (disconnect-by-overwrite) and catching searches displaced by the
    /// write. A handle key another record still claims is taken over first:
    /// the displaced owner's slot goes unknown, the report that would have
    /// told it about the change never arrived.
    fn set_slot(&mut self, node: NodeId, dim: Dimension, side: Side, value: Sibling) {
        let Some(old) = self.slot(node, dim, side) else {
            debug_assert!(false, "set_slot without a stored position");
            return;
        };
        if old == value {
            return;
        }
        if let Sibling::Node(x) = value
            && let Some(prior) = self.index.dim_mut(dim).evict(side, x)
            && prior != node
        {
            log::trace!(
                target: "tracker.children",
                "{prior:?} lost its {dim:?}/{side:?} claim on {x:?} to {node:?}"
            );
            if self.slot(prior, dim, side) == Some(Sibling::Node(x))
                && let Some(rec) = self.records.get_mut(&prior)
                && let Some(pos) = rec.position_mut(dim).as_mut()
            {
                *pos.side_mut(side) = Sibling::Unknown;
            }
        }
        let Some(rec) = self.records.get_mut(&node) else {
            debug_assert!(false, "set_slot on an untracked node");
            return;
        };
        let Some(pos) = rec.position_mut(dim).as_mut() else {
            return;
        };
        *pos.side_mut(side) = value;
        self.index.dim_mut(dim).rewrite(side, old, value, node);
        if let Sibling::Pending(q) = old {
            self.slot_overwrote_promise(q, node, dim, side);
        }
    }

    /// A slot that held a promise id was overwritten outside the promise
    /// machinery. The search loses its frontier (or its holder) and degrades
    /// to an unknown answer.
    fn slot_overwrote_promise(&mut self, id: PromiseId, node: NodeId, dim: Dimension, side: Side) {
        let Some(p) = self.promises.get(id) else {
            // the promise machinery is mid-update on this id
            return;
        };
        match dim {
            Dimension::Mutated if p.ptr == Some(node) && p.dir == side => {
                log::trace!(
                    target: "tracker.children",
                    "search of {:?}/{:?} lost its frontier, degrading to unknown",
                    p.origin,
                    p.dir
                );
                self.promises.remove(id);
                if self.position_of(p.origin, Dimension::Original).is_some() {
                    self.set_slot(p.origin, Dimension::Original, p.dir, Sibling::Unknown);
                }
            }
            Dimension::Original if p.origin == node && p.dir == side => {
                self.promises.remove(id);
                if let Some(ptr) = p.ptr
                    && self.position_of(ptr, Dimension::Mutated).is_some()
                {
                    self.set_slot(ptr, Dimension::Mutated, p.dir, Sibling::Unknown);
                }
            }
            _ => {}
        }
    }

    fn clear_position(&mut self, node: NodeId, dim: Dimension) {
        let Some(pos) = self.position_of(node, dim) else {
            return;
        };
        for side in Side::BOTH {
            match pos.side(side) {
                Sibling::Node(x) => {
                    self.index
                        .dim_mut(dim)
                        .rewrite(side, Sibling::Node(x), Sibling::Unknown, node);
                }
                Sibling::Pending(q) => self.slot_overwrote_promise(q, node, dim, side),
                _ => {}
            }
        }
        if let Some(rec) = self.records.get_mut(&node) {
            *rec.position_mut(dim) = None;
        }
    }

    fn set_position(&mut self, node: NodeId, dim: Dimension, pos: Position) {
        self.clear_position(node, dim);
        let Some(rec) = self.records.get_mut(&node) else {
            debug_assert!(false, "set_position on an untracked node");
            return;
        };
        *rec.position_mut(dim) = Some(Position::unknown(pos.parent));
        self.set_slot(node, dim, Side::Prev, pos.prev);
        self.set_slot(node, dim, Side::Next, pos.next);
    }

    // ---- promises ----------------------------------------------------------

    /// Writes the search's answer into its holder slot and drops the
    /// promise; a leftover placement is cleared to `Unknown`.
    fn resolve_promise(&mut self, id: PromiseId, value: Sibling, resolved: &mut Vec<NodeId>) {
        let Some(p) = self.promises.remove(id) else {
            debug_assert!(false, "resolving a promise twice");
            return;
        };
        if let Some(ptr) = p.ptr
            && self.position_of(ptr, Dimension::Mutated).is_some()
        {
            self.set_slot(ptr, Dimension::Mutated, p.dir, Sibling::Unknown);
        }
        if self.position_of(p.origin, Dimension::Original).is_some() {
            self.set_slot(p.origin, Dimension::Original, p.dir, value);
            if let Some(o) = self.position_of(p.origin, Dimension::Original)
                && o.fully_known()
            {
                resolved.push(p.origin);
            }
        }
        log::trace!(
            target: "tracker.children",
            "original {:?} of {:?} resolved to {value:?}",
            p.dir,
            p.origin
        );
    }

    fn discard_promise(&mut self, id: PromiseId) {
        let Some(p) = self.promises.remove(id) else {
            return;
        };
        if let Some(ptr) = p.ptr
            && self.position_of(ptr, Dimension::Mutated).is_some()
        {
            self.set_slot(ptr, Dimension::Mutated, p.dir, Sibling::Unknown);
        }
        if self.slot(p.origin, Dimension::Original, p.dir) == Some(Sibling::Pending(id)) {
            self.set_slot(p.origin, Dimension::Original, p.dir, Sibling::Unknown);
        }
    }

    /// Begins a search for `origin`'s original sibling in direction `dir`
    /// from the current-arrangement sibling `start`. Either resolves on the
    /// spot or leaves a parked promise on the frontier.
    fn start_search(&mut self, origin: NodeId, dir: Side, start: Sibling, resolved: &mut Vec<NodeId>) {
        match start {
            Sibling::Edge => self.set_slot(origin, Dimension::Original, dir, Sibling::Edge),
            Sibling::Node(h) if !self.records.contains_key(&h) => {
                self.set_slot(origin, Dimension::Original, dir, start);
            }
            Sibling::Node(_) => {
                let id = self.promises.create(origin, dir);
                self.set_slot(origin, Dimension::Original, dir, Sibling::Pending(id));
                self.walk_for_original(id, start, resolved);
            }
            Sibling::Unknown | Sibling::Pending(_) => {
                debug_assert!(false, "search started from an unrevealed sibling");
            }
        }
    }

    /// Parks a search on the origin's own unrevealed slot; used when nothing
    /// near the node's last known position is tracked.
    fn park_on_self(&mut self, origin: NodeId, dir: Side) {
        let id = self.promises.create(origin, dir);
        self.set_slot(origin, Dimension::Original, dir, Sibling::Pending(id));
        self.promises.set_ptr(id, Some(origin));
        self.set_slot(origin, Dimension::Mutated, dir, Sibling::Pending(id));
    }

    /// Advances an in-flight search through the stored mutated graph.
    /// `entry` is the next candidate: a fixed node or the list edge resolve
    /// the search, floating nodes are traversed, an unrevealed slot parks
    /// the promise, and an opposing parked search meeting the walk resolves
    /// both origins to each other.
    fn walk_for_original(&mut self, p: PromiseId, entry: Sibling, resolved: &mut Vec<NodeId>) {
        let Some(info) = self.promises.get(p) else {
            debug_assert!(false, "walking a resolved promise");
            return;
        };
        let dir = info.dir;
        let opp = dir.opposite();
        let mut seen = HashSet::new();
        let mut cur = entry;
        loop {
            let h = match cur {
                Sibling::Edge => {
                    self.resolve_promise(p, Sibling::Edge, resolved);
                    return;
                }
                Sibling::Node(h) => h,
                Sibling::Unknown | Sibling::Pending(_) => {
                    self.resolve_promise(p, Sibling::Unknown, resolved);
                    return;
                }
            };
            if !self.records.contains_key(&h) {
                self.resolve_promise(p, Sibling::Node(h), resolved);
                return;
            }
            if !seen.insert(h) {
                debug_assert!(false, "sibling search revisited {h:?}");
                self.resolve_promise(p, Sibling::Unknown, resolved);
                return;
            }
            if let Some(Sibling::Pending(q)) = self.slot(h, Dimension::Mutated, opp)
                && q != p
                && let Some(other) = self.promises.get(q)
            {
                if other.dir == opp {
                    // Two searches walking toward each other: everything
                    // between their origins floats, so the origins were
                    // originally adjacent.
                    self.promises.set_ptr(q, None);
                    self.set_slot(h, Dimension::Mutated, opp, Sibling::Unknown);
                    self.resolve_promise(q, Sibling::Node(info.origin), resolved);
                    self.resolve_promise(p, Sibling::Node(other.origin), resolved);
                    return;
                }
                debug_assert!(false, "placement side does not match its direction");
            }
            match self.slot(h, Dimension::Mutated, dir) {
                Some(Sibling::Node(n)) => cur = Sibling::Node(n),
                Some(Sibling::Edge) => {
                    self.resolve_promise(p, Sibling::Edge, resolved);
                    return;
                }
                Some(Sibling::Unknown) => {
                    self.promises.set_ptr(p, Some(h));
                    self.set_slot(h, Dimension::Mutated, dir, Sibling::Pending(p));
                    return;
                }
                Some(Sibling::Pending(_)) => {
                    debug_assert!(false, "two searches parked on one frontier");
                    self.resolve_promise(p, Sibling::Unknown, resolved);
                    return;
                }
                None => {
                    self.resolve_promise(p, Sibling::Unknown, resolved);
                    return;
                }
            }
        }
    }

    // ---- the report pipeline ----------------------------------------------

    /// One child-list report: inside `parent`, `[prev, ...removed, next]`
    /// became `[prev, ...added, next]`.
    pub fn apply(
        &mut self,
        parent: NodeId,
        removed: &[NodeId],
        added: &[NodeId],
        prev: Option<NodeId>,
        next: Option<NodeId>,
    ) {
        let prev_sib = Sibling::from_option(prev);
        let next_sib = Sibling::from_option(next);
        log::trace!(
            target: "tracker.children",
            "report parent={parent:?} removed={removed:?} added={added:?} prev={prev:?} next={next:?}"
        );
        let mut resolved = Vec::new();

        // 1. Resolve parked searches against the reported neighbourhood
        //    before the removal overwrites it.
        let step1_touched = self.resolve_in_neighbourhood(removed, prev_sib, next_sib, &mut resolved);

        // 2. Removals.
        let mut fixed_new = Vec::new();
        let mut revert_possible = false;
        for &h in removed {
            if let Some(rec) = self.records.get(&h).copied() {
                self.clear_position(h, Dimension::Mutated);
                match rec.original {
                    None => {
                        // an untracked-origin add removed again: cancels out
                        self.records.remove(&h);
                        log::trace!(target: "tracker.children", "add of {h:?} cancelled");
                    }
                    Some(o) => {
                        if o.parent == parent {
                            revert_possible = true;
                        }
                    }
                }
            } else if let Some(origin_parent) = self.unseen_evidence(h, parent) {
                self.track_revealed(h, origin_parent, None, &mut resolved);
            } else {
                self.records.insert(
                    h,
                    MovedNode {
                        original: Some(Position::unknown(parent)),
                        mutated: None,
                    },
                );
                fixed_new.push(h);
                revert_possible = true;
            }
        }

        // 3. Original siblings for nodes that were fixed until this removal.
        self.assign_original_siblings(&fixed_new, prev_sib, next_sib, &mut resolved);

        // 4. Additions.
        for b in [prev, next].into_iter().flatten() {
            if !self.records.contains_key(&b)
                && let Some(origin_parent) = self.unseen_evidence(b, parent)
            {
                self.track_revealed(b, origin_parent, Some(parent), &mut resolved);
            }
        }
        let first_added = added.first().map(|h| Sibling::Node(*h)).unwrap_or(next_sib);
        let last_added = added.last().map(|h| Sibling::Node(*h)).unwrap_or(prev_sib);
        if let Some(p) = prev
            && self.records.contains_key(&p)
        {
            self.ensure_mutated_at(p, parent);
            self.set_slot(p, Dimension::Mutated, Side::Next, first_added);
        }
        if let Some(n) = next
            && self.records.contains_key(&n)
        {
            self.ensure_mutated_at(n, parent);
            self.set_slot(n, Dimension::Mutated, Side::Prev, last_added);
        }
        let mut candidates = Vec::new();
        for (i, &h) in added.iter().enumerate() {
            let prev_val = if i == 0 {
                prev_sib
            } else {
                Sibling::Node(added[i - 1])
            };
            let next_val = if i + 1 == added.len() {
                next_sib
            } else {
                Sibling::Node(added[i + 1])
            };
            if let Some(rec) = self.records.get(&h).copied() {
                if let Some(o) = rec.original
                    && o.parent == parent
                {
                    candidates.push(h);
                }
            } else if let Some(origin_parent) = self.unseen_evidence(h, parent) {
                self.track_revealed(h, origin_parent, Some(parent), &mut resolved);
            } else {
                // untracked-origin add: no original position to return to
                self.records.insert(h, MovedNode::default());
            }
            self.set_mutated_position(h, Position::new(parent, prev_val, next_val));
        }

        // 5. Reversion checks.
        let mut dead = DeadSides::new();
        if !candidates.is_empty() || revert_possible || step1_touched {
            self.check_region(parent, prev_sib, next_sib, &candidates, &mut dead);
        }
        resolved.sort_unstable();
        resolved.dedup();
        for r in resolved {
            let Some(rec) = self.records.get(&r).copied() else {
                continue;
            };
            let (Some(o), Some(m)) = (rec.original, rec.mutated) else {
                continue;
            };
            if o.parent != parent || m.parent != parent {
                continue;
            }
            if dead.get(&r).copied().unwrap_or(0) & (DEAD_PREV | DEAD_NEXT)
                == DEAD_PREV | DEAD_NEXT
            {
                continue;
            }
            self.check_region(parent, m.prev, m.next, &[r], &mut dead);
        }

        // 6. Debug-only integrity self-check.
        #[cfg(debug_assertions)]
        self.check_integrity();
    }

    /// Step 1: every parked search whose frontier sits inside the reported
    /// run `[prev, ...removed, next]` learns its revealed neighbour and is
    /// advanced. Returns whether any search was touched.
    fn resolve_in_neighbourhood(
        &mut self,
        removed: &[NodeId],
        prev_sib: Sibling,
        next_sib: Sibling,
        resolved: &mut Vec<NodeId>,
    ) -> bool {
        let mut seq = Vec::with_capacity(removed.len() + 2);
        seq.push(prev_sib);
        seq.extend(removed.iter().map(|h| Sibling::Node(*h)));
        seq.push(next_sib);
        let mut touched = false;

        for i in 0..seq.len() - 1 {
            let Sibling::Node(h) = seq[i] else { continue };
            let Some(Sibling::Pending(p)) = self.slot(h, Dimension::Mutated, Side::Next) else {
                continue;
            };
            touched = true;
            self.promises.set_ptr(p, None);
            self.set_slot(h, Dimension::Mutated, Side::Next, seq[i + 1]);
            self.resume_through_sequence(p, &seq, i + 1, Side::Next, resolved);
        }
        for i in (1..seq.len()).rev() {
            let Sibling::Node(h) = seq[i] else { continue };
            let Some(Sibling::Pending(p)) = self.slot(h, Dimension::Mutated, Side::Prev) else {
                continue;
            };
            touched = true;
            self.promises.set_ptr(p, None);
            self.set_slot(h, Dimension::Mutated, Side::Prev, seq[i - 1]);
            self.resume_through_sequence(p, &seq, i - 1, Side::Prev, resolved);
        }
        touched
    }

    /// Scans a resumed search along the reported sequence. Fixed handles and
    /// edges resolve it, floating entries are skipped, a parked opposing
    /// search meets it back-to-back, and a floating boundary hands the walk
    /// over to the stored graph.
    fn resume_through_sequence(
        &mut self,
        p: PromiseId,
        seq: &[Sibling],
        from: usize,
        dir: Side,
        resolved: &mut Vec<NodeId>,
    ) {
        let opp = dir.opposite();
        let mut j = from;
        loop {
            let at_boundary = match dir {
                Side::Next => j + 1 == seq.len(),
                Side::Prev => j == 0,
            };
            match seq[j] {
                Sibling::Edge => {
                    self.resolve_promise(p, Sibling::Edge, resolved);
                    return;
                }
                Sibling::Node(x) if !self.records.contains_key(&x) => {
                    self.resolve_promise(p, Sibling::Node(x), resolved);
                    return;
                }
                Sibling::Node(x) => {
                    if let Some(Sibling::Pending(q)) = self.slot(x, Dimension::Mutated, opp)
                        && let Some(other) = self.promises.get(q)
                        && other.dir == opp
                    {
                        let reveal = match dir {
                            Side::Next => seq[j - 1],
                            Side::Prev => seq[j + 1],
                        };
                        let Some(me) = self.promises.get(p) else {
                            debug_assert!(false, "in-flight promise vanished");
                            return;
                        };
                        self.promises.set_ptr(q, None);
                        self.set_slot(x, Dimension::Mutated, opp, reveal);
                        self.resolve_promise(q, Sibling::Node(me.origin), resolved);
                        self.resolve_promise(p, Sibling::Node(other.origin), resolved);
                        return;
                    }
                    if at_boundary {
                        self.walk_for_original(p, Sibling::Node(x), resolved);
                        return;
                    }
                    j = match dir {
                        Side::Next => j + 1,
                        Side::Prev => j - 1,
                    };
                }
                Sibling::Unknown | Sibling::Pending(_) => {
                    debug_assert!(false, "report sequence contains a non-handle");
                    self.resolve_promise(p, Sibling::Unknown, resolved);
                    return;
                }
            }
        }
    }

    /// Step 3: newly tracked removed nodes learn their original siblings.
    /// An original-index entry wins (the neighbour moved away earlier and
    /// already recorded the adjacency), then the adjacent entry of the same
    /// removal, then a search from the report boundary.
    fn assign_original_siblings(
        &mut self,
        fixed_new: &[NodeId],
        prev_sib: Sibling,
        next_sib: Sibling,
        resolved: &mut Vec<NodeId>,
    ) {
        for (k, &f) in fixed_new.iter().enumerate() {
            if let Some(m) = self.index.original().owner(Side::Next, f) {
                // m.original.next == f: m sat right before f originally
                self.set_slot(f, Dimension::Original, Side::Prev, Sibling::Node(m));
            } else if k > 0 {
                self.set_slot(f, Dimension::Original, Side::Prev, Sibling::Node(fixed_new[k - 1]));
            } else {
                self.start_search(f, Side::Prev, prev_sib, resolved);
            }
            if let Some(m) = self.index.original().owner(Side::Prev, f) {
                self.set_slot(f, Dimension::Original, Side::Next, Sibling::Node(m));
            } else if k + 1 < fixed_new.len() {
                self.set_slot(f, Dimension::Original, Side::Next, Sibling::Node(fixed_new[k + 1]));
            } else {
                self.start_search(f, Side::Next, next_sib, resolved);
            }
        }
    }

    /// An untracked handle is only left untracked when the graph has no
    /// contrary knowledge. A mutated-index entry placing it in a different
    /// parent means it moved without a report.
    fn unseen_evidence(&self, h: NodeId, parent: NodeId) -> Option<NodeId> {
        for side in Side::BOTH {
            if let Some(owner) = self.index.mutated().owner(side, h)
                && let Some(m) = self.position_of(owner, Dimension::Mutated)
                && m.parent != parent
            {
                return Some(m.parent);
            }
        }
        None
    }

    /// First sight of a node that moved inside an unwatched subtree: track
    /// it with the evidenced parent as its original parent and search for
    /// its original siblings around the recorded neighbours. `seen_in` is
    /// the parent it is currently showing up in (None when it shows up being
    /// removed).
    fn track_revealed(
        &mut self,
        h: NodeId,
        origin_parent: NodeId,
        seen_in: Option<NodeId>,
        resolved: &mut Vec<NodeId>,
    ) {
        log::trace!(
            target: "tracker.children",
            "untracked {h:?} revealed, last known in {origin_parent:?}"
        );
        let after = self.index.mutated().owner(Side::Prev, h);
        let before = self.index.mutated().owner(Side::Next, h);
        let mutated = seen_in.map(Position::unknown);
        self.records.insert(
            h,
            MovedNode {
                original: Some(Position::unknown(origin_parent)),
                mutated,
            },
        );
        match before {
            Some(b) => self.start_search(h, Side::Prev, Sibling::Node(b), resolved),
            None if seen_in.is_some() => self.park_on_self(h, Side::Prev),
            None => {}
        }
        match after {
            Some(a) => self.start_search(h, Side::Next, Sibling::Node(a), resolved),
            None if seen_in.is_some() => self.park_on_self(h, Side::Next),
            None => {}
        }
    }

    fn ensure_mutated_at(&mut self, node: NodeId, parent: NodeId) {
        match self.position_of(node, Dimension::Mutated) {
            Some(m) if m.parent == parent => {}
            Some(_) => {
                log::trace!(
                    target: "tracker.children",
                    "stale position of {node:?} replaced by report in {parent:?}"
                );
                self.clear_position(node, Dimension::Mutated);
                if let Some(rec) = self.records.get_mut(&node) {
                    rec.mutated = Some(Position::unknown(parent));
                }
            }
            None => {
                if let Some(rec) = self.records.get_mut(&node) {
                    rec.mutated = Some(Position::unknown(parent));
                }
            }
        }
    }

    fn set_mutated_position(&mut self, node: NodeId, pos: Position) {
        self.clear_position(node, Dimension::Mutated);
        let Some(rec) = self.records.get_mut(&node) else {
            debug_assert!(false, "positioning an untracked node");
            return;
        };
        rec.mutated = Some(Position::unknown(pos.parent));
        self.set_slot(node, Dimension::Mutated, Side::Prev, pos.prev);
        self.set_slot(node, Dimension::Mutated, Side::Next, pos.next);
    }

    // ---- reversion ---------------------------------------------------------

    /// Extends from `from` in direction `side` through the current
    /// arrangement: same-list floats are collected (nearest first), floats
    /// belonging to another list are skipped, and the first settled thing
    /// (fixed handle or edge) becomes the anchor. An unrevealed slot ends
    /// the side without an anchor.
    fn extend_side(
        &self,
        parent: NodeId,
        from: Sibling,
        side: Side,
    ) -> (Vec<NodeId>, Option<Sibling>) {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = from;
        loop {
            match cur {
                Sibling::Edge => return (out, Some(Sibling::Edge)),
                Sibling::Unknown | Sibling::Pending(_) => return (out, None),
                Sibling::Node(h) => {
                    if !seen.insert(h) {
                        return (out, None);
                    }
                    let Some(rec) = self.records.get(&h) else {
                        return (out, Some(Sibling::Node(h)));
                    };
                    let Some(m) = rec.mutated else {
                        return (out, None);
                    };
                    if m.parent != parent {
                        return (out, None);
                    }
                    if let Some(o) = rec.original
                        && o.parent == parent
                    {
                        out.push(h);
                    }
                    cur = m.side(side);
                }
            }
        }
    }

    /// Runs one reversion check over the contiguous region spanned by
    /// `left_from ... inner ... right_from`.
    fn check_region(
        &mut self,
        parent: NodeId,
        left_from: Sibling,
        right_from: Sibling,
        inner: &[NodeId],
        dead: &mut DeadSides,
    ) {
        let (left, left_anchor) = self.extend_side(parent, left_from, Side::Prev);
        let (right, right_anchor) = self.extend_side(parent, right_from, Side::Next);
        let mut span = Vec::with_capacity(left.len() + inner.len() + right.len());
        let mut dedup = HashSet::new();
        for h in left
            .into_iter()
            .rev()
            .chain(inner.iter().copied())
            .chain(right)
        {
            if dedup.insert(h) {
                span.push(h);
            }
        }
        self.run_passes(parent, &span, left_anchor, right_anchor, dead);
    }

    fn run_passes(
        &mut self,
        parent: NodeId,
        span: &[NodeId],
        left_anchor: Option<Sibling>,
        right_anchor: Option<Sibling>,
        dead: &mut DeadSides,
    ) {
        // Pass from the right anchor, matching each candidate's original
        // next sibling and propagating leftward.
        let failure = match right_anchor {
            None => Some(span.len()),
            Some(mut anchor) => {
                let mut failure = None;
                for i in (0..span.len()).rev() {
                    let c = span[i];
                    let blocked = dead.get(&c).copied().unwrap_or(0) & DEAD_NEXT != 0;
                    if blocked || self.position_of(c, Dimension::Original).map(|o| o.next) != Some(anchor) {
                        *dead.entry(c).or_default() |= DEAD_NEXT;
                        failure = Some(i);
                        break;
                    }
                    self.mark_fixed(c);
                    anchor = Sibling::Node(c);
                }
                failure
            }
        };
        // Pass from the left anchor toward the failure point (exclusive),
        // matching original prev siblings.
        if let (Some(mut anchor), Some(limit)) = (left_anchor, failure) {
            for &c in span.iter().take(limit) {
                let blocked = dead.get(&c).copied().unwrap_or(0) & DEAD_PREV != 0;
                if blocked || self.position_of(c, Dimension::Original).map(|o| o.prev) != Some(anchor) {
                    *dead.entry(c).or_default() |= DEAD_PREV;
                    break;
                }
                self.mark_fixed(c);
                anchor = Sibling::Node(c);
            }
        }
        // Reverted nodes can re-anchor floats beyond the span.
        if let Some(Sibling::Node(a)) = left_anchor {
            self.propagate_outward(parent, a, Side::Prev, dead);
        }
        if let Some(Sibling::Node(a)) = right_anchor {
            self.propagate_outward(parent, a, Side::Next, dead);
        }
    }

    /// Walks outward from a settled handle, fixing each same-list float
    /// whose original sibling toward the anchor matches, skipping floats
    /// that belong to another list.
    fn propagate_outward(
        &mut self,
        parent: NodeId,
        from: NodeId,
        walk_side: Side,
        dead: &mut DeadSides,
    ) {
        let match_side = walk_side.opposite();
        let bit = match match_side {
            Side::Prev => DEAD_PREV,
            Side::Next => DEAD_NEXT,
        };
        let mut cursor = from;
        let mut target = Sibling::Node(from);
        let mut seen = HashSet::new();
        loop {
            let Some(g) = self.index.mutated().owner(match_side, cursor) else {
                return;
            };
            if !seen.insert(g) {
                return;
            }
            let Some(rec) = self.records.get(&g).copied() else {
                return;
            };
            let Some(m) = rec.mutated else {
                return;
            };
            if m.parent != parent {
                return;
            }
            match rec.original {
                Some(o) if o.parent == parent => {
                    if dead.get(&g).copied().unwrap_or(0) & bit != 0 {
                        return;
                    }
                    if o.side(match_side) == target {
                        self.mark_fixed(g);
                        cursor = g;
                        target = Sibling::Node(g);
                    } else {
                        *dead.entry(g).or_default() |= bit;
                        return;
                    }
                }
                _ => cursor = g,
            }
        }
    }

    /// The node is back at its original position: its record, index entries
    /// and promises go away atomically. Searches parked on its slots resolve
    /// to the node itself (it is a settled original sibling now); searches
    /// it still owns are moot.
    fn mark_fixed(&mut self, node: NodeId) {
        let Some(rec) = self.records.get(&node).copied() else {
            return;
        };
        if let Some(m) = rec.mutated {
            for side in Side::BOTH {
                if let Sibling::Pending(q) = m.side(side)
                    && let Some(p) = self.promises.get(q)
                {
                    self.promises.set_ptr(q, None);
                    self.set_slot(node, Dimension::Mutated, side, Sibling::Unknown);
                    let mut scratch = Vec::new();
                    let answer = if p.origin == node {
                        Sibling::Unknown
                    } else {
                        Sibling::Node(node)
                    };
                    self.resolve_promise(q, answer, &mut scratch);
                }
            }
        }
        if let Some(o) = self.position_of(node, Dimension::Original) {
            for side in Side::BOTH {
                if let Sibling::Pending(q) = o.side(side) {
                    self.discard_promise(q);
                }
            }
        }
        self.clear_position(node, Dimension::Original);
        self.clear_position(node, Dimension::Mutated);
        self.records.remove(&node);
        log::trace!(target: "tracker.children", "node {node:?} reverted");
    }

    // ---- synchronize -------------------------------------------------------

    /// One-shot finalization once the caller certifies that every pending
    /// report has been delivered: every unrevealed mutated slot is filled
    /// from the live tree, outstanding searches resolve against it, and the
    /// newly revealed adjacencies get their reversion checks.
    pub fn synchronize(&mut self, dom: &Dom) {
        let ids = self.sorted_ids();
        let mut next_outstanding: Vec<(PromiseId, NodeId)> = Vec::new();
        let mut prev_outstanding: HashMap<NodeId, PromiseId> = HashMap::new();
        let mut candidates: Vec<NodeId> = Vec::new();
        let mut hints: Vec<(NodeId, NodeId)> = Vec::new();
        let mut resolved = Vec::new();

        for &id in &ids {
            let Some(rec) = self.records.get(&id).copied() else {
                continue;
            };
            let mut touched = false;
            match rec.mutated {
                None => {
                    if dom.parent(id).is_some() {
                        // attached without any report: adopt the live position
                        let pos = live_position(dom, id);
                        self.set_position(id, Dimension::Mutated, pos);
                        touched = true;
                        for side in Side::BOTH {
                            self.note_exposure(id, pos.side(side), side, &mut hints);
                        }
                    }
                }
                Some(m) => {
                    for side in Side::BOTH {
                        match m.side(side) {
                            Sibling::Unknown => {
                                let live = live_sibling(dom, id, side);
                                self.set_slot(id, Dimension::Mutated, side, live);
                                touched = true;
                                self.note_exposure(id, live, side, &mut hints);
                            }
                            Sibling::Pending(q) => {
                                let Some(p) = self.promises.get(q) else {
                                    continue;
                                };
                                self.promises.set_ptr(q, None);
                                let live = live_sibling(dom, id, side);
                                self.set_slot(id, Dimension::Mutated, side, live);
                                touched = true;
                                self.note_exposure(id, live, side, &mut hints);
                                match p.dir {
                                    Side::Next => next_outstanding.push((q, id)),
                                    Side::Prev => {
                                        prev_outstanding.insert(id, q);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            if touched
                && let Some(rec) = self.records.get(&id)
                && let (Some(o), Some(m)) = (rec.original, rec.mutated)
                && o.parent == m.parent
            {
                candidates.push(id);
            }
        }

        // A claim handed over during the fill leaves its displaced owner
        // unknown again; settle those from the live tree until nothing
        // moves. Live values only evict stale claims, so this converges.
        loop {
            let mut changed = false;
            for &id in &ids {
                let Some(m) = self.position_of(id, Dimension::Mutated) else {
                    continue;
                };
                for side in Side::BOTH {
                    if m.side(side) != Sibling::Unknown {
                        continue;
                    }
                    let live = live_sibling(dom, id, side);
                    self.set_slot(id, Dimension::Mutated, side, live);
                    self.note_exposure(id, live, side, &mut hints);
                    changed = true;
                    if let Some(rec) = self.records.get(&id)
                        && let (Some(o), Some(m2)) = (rec.original, rec.mutated)
                        && o.parent == m2.parent
                    {
                        candidates.push(id);
                    }
                }
            }
            if !changed {
                break;
            }
        }

        // Outstanding next-searches walk the live chain rightward; a walk
        // arriving at the former frontier of a prev-search meets it.
        for (q, ptr) in next_outstanding {
            let Some(info) = self.promises.get(q) else {
                continue;
            };
            let mut cur = dom.next_sibling(ptr);
            loop {
                match cur {
                    None => {
                        self.resolve_promise(q, Sibling::Edge, &mut resolved);
                        break;
                    }
                    Some(w) if !self.records.contains_key(&w) => {
                        self.resolve_promise(q, Sibling::Node(w), &mut resolved);
                        break;
                    }
                    Some(w) => {
                        if let Some(&qp) = prev_outstanding.get(&w) {
                            let Some(other) = self.promises.get(qp) else {
                                prev_outstanding.remove(&w);
                                continue;
                            };
                            self.resolve_promise(qp, Sibling::Node(info.origin), &mut resolved);
                            self.resolve_promise(q, Sibling::Node(other.origin), &mut resolved);
                            prev_outstanding.remove(&w);
                            break;
                        }
                        cur = dom.next_sibling(w);
                    }
                }
            }
        }
        // Remaining prev-searches walk leftward; no meeting is possible now.
        let mut prevs: Vec<(NodeId, PromiseId)> = prev_outstanding.into_iter().collect();
        prevs.sort_unstable();
        for (ptr, q) in prevs {
            if self.promises.get(q).is_none() {
                continue;
            }
            let mut cur = dom.prev_sibling(ptr);
            loop {
                match cur {
                    None => {
                        self.resolve_promise(q, Sibling::Edge, &mut resolved);
                        break;
                    }
                    Some(w) if !self.records.contains_key(&w) => {
                        self.resolve_promise(q, Sibling::Node(w), &mut resolved);
                        break;
                    }
                    Some(w) => cur = dom.prev_sibling(w),
                }
            }
        }

        resolved.sort_unstable();
        resolved.dedup();
        candidates.extend(resolved);
        candidates.sort_unstable();
        candidates.dedup();

        let mut dead = DeadSides::new();
        for c in candidates {
            let Some(rec) = self.records.get(&c).copied() else {
                continue;
            };
            let (Some(o), Some(m)) = (rec.original, rec.mutated) else {
                continue;
            };
            if o.parent != m.parent {
                continue;
            }
            self.check_region(m.parent, m.prev, m.next, &[c], &mut dead);
        }
        for (l, r) in hints {
            let Some(m) = self.position_of(r, Dimension::Mutated) else {
                continue;
            };
            self.check_region(m.parent, Sibling::Node(l), Sibling::Node(r), &[], &mut dead);
        }

        #[cfg(debug_assertions)]
        {
            self.check_integrity();
            self.check_synchronized();
        }
    }

    /// Records a pair hint for a freshly revealed adjacency when neither
    /// endpoint sits in its own original list; the revelation may still
    /// unblock reverts of floats beyond them.
    fn note_exposure(
        &self,
        owner: NodeId,
        value: Sibling,
        side: Side,
        hints: &mut Vec<(NodeId, NodeId)>,
    ) {
        let Sibling::Node(x) = value else { return };
        let misplaced = |n: NodeId| match self.records.get(&n) {
            None => false,
            Some(rec) => !matches!(
                (rec.original, rec.mutated),
                (Some(o), Some(m)) if o.parent == m.parent
            ),
        };
        if misplaced(owner) && misplaced(x) {
            match side {
                Side::Prev => hints.push((x, owner)),
                Side::Next => hints.push((owner, x)),
            }
        }
    }

    // ---- debug checks ------------------------------------------------------

    #[cfg(debug_assertions)]
    fn check_integrity(&self) {
        use Dimension::{Mutated, Original};
        for (&id, rec) in &self.records {
            assert!(
                rec.original.is_some() || rec.mutated.is_some(),
                "empty record kept for {id:?}"
            );
            for (dim, pos) in [(Original, rec.original), (Mutated, rec.mutated)] {
                let Some(pos) = pos else { continue };
                for side in Side::BOTH {
                    match pos.side(side) {
                        Sibling::Node(x) => {
                            assert_eq!(
                                self.index.dim(dim).owner(side, x),
                                Some(id),
                                "index lost {dim:?}/{side:?} entry of {id:?}"
                            );
                        }
                        Sibling::Pending(q) => {
                            let Some(p) = self.promises.get(q) else {
                                panic!("slot of {id:?} holds a dead promise");
                            };
                            match dim {
                                Mutated => {
                                    assert_eq!(p.ptr, Some(id), "placement mismatch for {id:?}");
                                    assert_eq!(p.dir, side, "placement side mismatch");
                                }
                                Original => {
                                    assert_eq!(p.origin, id, "holder mismatch for {id:?}");
                                    assert_eq!(p.dir, side, "holder side mismatch");
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        for dim in [Original, Mutated] {
            for side in Side::BOTH {
                for (x, owner) in self.index.dim(dim).entries(side) {
                    let Some(rec) = self.records.get(&owner) else {
                        panic!("index entry for destroyed record {owner:?}");
                    };
                    assert_eq!(
                        rec.position(dim).map(|p| p.side(side)),
                        Some(Sibling::Node(x)),
                        "spurious index entry {dim:?}/{side:?} {x:?} -> {owner:?}"
                    );
                }
            }
        }
        for (id, p) in self.promises.iter() {
            let Some(ptr) = p.ptr else {
                panic!("promise {id} left in flight");
            };
            assert_eq!(
                self.slot(ptr, Dimension::Mutated, p.dir),
                Some(Sibling::Pending(id)),
                "promise {id} placement slot mismatch"
            );
            assert_eq!(
                self.slot(p.origin, Dimension::Original, p.dir),
                Some(Sibling::Pending(id)),
                "promise {id} holder slot mismatch"
            );
        }
    }

    #[cfg(debug_assertions)]
    fn check_synchronized(&self) {
        assert!(self.promises.is_empty(), "promises survived synchronize");
        for (&id, rec) in &self.records {
            if let Some(m) = rec.mutated {
                assert!(
                    m.fully_known(),
                    "mutated position of {id:?} still unknown after synchronize"
                );
            }
        }
    }
}

fn live_sibling(dom: &Dom, node: NodeId, side: Side) -> Sibling {
    Sibling::from_option(match side {
        Side::Prev => dom.prev_sibling(node),
        Side::Next => dom.next_sibling(node),
    })
}

fn live_position(dom: &Dom, node: NodeId) -> Position {
    debug_assert!(dom.parent(node).is_some(), "live position of a detached node");
    let parent = dom.parent(node).unwrap_or(node);
    Position::new(
        parent,
        live_sibling(dom, node, Side::Prev),
        live_sibling(dom, node, Side::Next),
    )
}
