//! Boundary ranges over [`Dom`] trees.
//!
//! Contract:
//! - Endpoints reference node boundaries (before/after open, before/after
//!   close), not child offsets, so a range stays meaningful while content
//!   inside it is mutated.
//! - `extend` computes the union in document order; both ranges must anchor
//!   in the same tree.
//! - `normalize` shifts endpoints outward onto neighbours so that further
//!   mutation strictly inside the range cannot move them.

use std::cmp::Ordering;

use crate::tree::{Dom, NodeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    BeforeOpen,
    AfterOpen,
    BeforeClose,
    AfterClose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryPoint {
    pub node: NodeId,
    pub at: Boundary,
}

impl BoundaryPoint {
    pub fn new(node: NodeId, at: Boundary) -> Self {
        Self { node, at }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundaryRange {
    ends: Option<(BoundaryPoint, BoundaryPoint)>,
}

impl BoundaryRange {
    pub fn null() -> Self {
        Self { ends: None }
    }

    pub fn is_null(&self) -> bool {
        self.ends.is_none()
    }

    pub fn start(&self) -> Option<BoundaryPoint> {
        self.ends.map(|(s, _)| s)
    }

    pub fn end(&self) -> Option<BoundaryPoint> {
        self.ends.map(|(_, e)| e)
    }

    /// Range covering `node` from just before its open boundary to just
    /// after its close boundary.
    pub fn select_node(node: NodeId) -> Self {
        Self {
            ends: Some((
                BoundaryPoint::new(node, Boundary::BeforeOpen),
                BoundaryPoint::new(node, Boundary::AfterClose),
            )),
        }
    }

    pub fn set_start(&mut self, node: NodeId, at: Boundary) {
        let point = BoundaryPoint::new(node, at);
        self.ends = Some(match self.ends {
            Some((_, end)) => (point, end),
            None => (point, point),
        });
    }

    pub fn set_end(&mut self, node: NodeId, at: Boundary) {
        let point = BoundaryPoint::new(node, at);
        self.ends = Some(match self.ends {
            Some((start, _)) => (start, point),
            None => (point, point),
        });
    }

    pub fn collapse(&mut self, to_start: bool) {
        if let Some((start, end)) = self.ends {
            let point = if to_start { start } else { end };
            self.ends = Some((point, point));
        }
    }

    /// Union with `other`: the resulting range covers both. A null side is
    /// absorbed.
    pub fn extend(&mut self, dom: &Dom, other: &BoundaryRange) {
        let Some((os, oe)) = other.ends else {
            return;
        };
        let Some((start, end)) = self.ends else {
            self.ends = other.ends;
            return;
        };
        let new_start = if compare_points(dom, os, start) == Ordering::Less {
            os
        } else {
            start
        };
        let new_end = if compare_points(dom, oe, end) == Ordering::Greater {
            oe
        } else {
            end
        };
        self.ends = Some((new_start, new_end));
    }

    /// Moves endpoints off the outermost covered nodes: a `BeforeOpen` start
    /// becomes the previous sibling's `AfterClose` (or the parent's
    /// `AfterOpen`), an `AfterClose` end becomes the next sibling's
    /// `BeforeOpen` (or the parent's `BeforeClose`).
    pub fn normalize(&mut self, dom: &Dom) {
        let Some((mut start, mut end)) = self.ends else {
            return;
        };
        if start.at == Boundary::BeforeOpen {
            if let Some(prev) = dom.prev_sibling(start.node) {
                start = BoundaryPoint::new(prev, Boundary::AfterClose);
            } else if let Some(parent) = dom.parent(start.node) {
                start = BoundaryPoint::new(parent, Boundary::AfterOpen);
            }
        }
        if end.at == Boundary::AfterClose {
            if let Some(next) = dom.next_sibling(end.node) {
                end = BoundaryPoint::new(next, Boundary::BeforeOpen);
            } else if let Some(parent) = dom.parent(end.node) {
                end = BoundaryPoint::new(parent, Boundary::BeforeClose);
            }
        }
        self.ends = Some((start, end));
    }
}

/// Document-order comparison of two boundary points in the same tree.
///
/// Points are mapped onto root paths where a child at index `i` occupies
/// slot `2i + 1` and the gaps around it slots `2i` / `2i + 2`; lexicographic
/// comparison of the encoded paths then matches document order, and the two
/// spellings of one gap (`AfterOpen` of the parent vs `BeforeOpen` of the
/// first child) compare equal.
pub fn compare_points(dom: &Dom, a: BoundaryPoint, b: BoundaryPoint) -> Ordering {
    point_key(dom, a).cmp(&point_key(dom, b))
}

fn node_path(dom: &Dom, node: NodeId) -> Vec<u64> {
    let mut rev = Vec::new();
    let mut cur = node;
    while let Some(parent) = dom.parent(cur) {
        let idx = dom
            .children(parent)
            .iter()
            .position(|c| *c == cur)
            .unwrap_or(0);
        rev.push(2 * idx as u64 + 1);
        cur = parent;
    }
    rev.push(1);
    rev.reverse();
    rev
}

fn point_key(dom: &Dom, point: BoundaryPoint) -> Vec<u64> {
    let mut key = node_path(dom, point.node);
    match point.at {
        // The node itself sits at an odd slot; the gaps next to it are the
        // even slots either side.
        Boundary::BeforeOpen => {
            if let Some(last) = key.last_mut() {
                *last -= 1;
            }
        }
        Boundary::AfterClose => {
            if let Some(last) = key.last_mut() {
                *last += 1;
            }
        }
        Boundary::AfterOpen => key.push(0),
        Boundary::BeforeClose => key.push(2 * dom.children(point.node).len() as u64),
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(dom: &mut Dom) -> (NodeId, NodeId, NodeId) {
        let root = dom.create_element("root");
        let a = dom.create_element("a");
        let b = dom.create_element("b");
        dom.append(root, a).expect("append failed");
        dom.append(root, b).expect("append failed");
        (root, a, b)
    }

    #[test]
    fn document_order_over_siblings_and_depth() {
        let mut dom = Dom::new();
        let (root, a, b) = flat(&mut dom);
        let inner = dom.create_element("inner");
        dom.append(a, inner).expect("append failed");

        let before_a = BoundaryPoint::new(a, Boundary::BeforeOpen);
        let after_a = BoundaryPoint::new(a, Boundary::AfterClose);
        let before_b = BoundaryPoint::new(b, Boundary::BeforeOpen);
        let inside_a = BoundaryPoint::new(inner, Boundary::BeforeOpen);
        let open_root = BoundaryPoint::new(root, Boundary::AfterOpen);

        assert_eq!(compare_points(&dom, before_a, after_a), Ordering::Less);
        assert_eq!(compare_points(&dom, after_a, before_b), Ordering::Equal);
        assert_eq!(compare_points(&dom, before_a, inside_a), Ordering::Less);
        assert_eq!(compare_points(&dom, inside_a, after_a), Ordering::Less);
        assert_eq!(compare_points(&dom, open_root, before_a), Ordering::Equal);
    }

    #[test]
    fn extend_widens_to_the_union() {
        let mut dom = Dom::new();
        let (_root, a, b) = flat(&mut dom);
        let mut range = BoundaryRange::select_node(b);
        range.extend(&dom, &BoundaryRange::select_node(a));
        assert_eq!(range.start(), Some(BoundaryPoint::new(a, Boundary::BeforeOpen)));
        assert_eq!(range.end(), Some(BoundaryPoint::new(b, Boundary::AfterClose)));

        let mut null = BoundaryRange::null();
        null.extend(&dom, &range);
        assert_eq!(null, range);
    }

    #[test]
    fn normalize_moves_endpoints_onto_neighbours() {
        let mut dom = Dom::new();
        let (root, a, b) = flat(&mut dom);
        let mut range = BoundaryRange::select_node(a);
        range.extend(&dom, &BoundaryRange::select_node(b));
        range.normalize(&dom);
        // No previous sibling before `a`, so the start lands inside root.
        assert_eq!(range.start(), Some(BoundaryPoint::new(root, Boundary::AfterOpen)));
        assert_eq!(range.end(), Some(BoundaryPoint::new(root, Boundary::BeforeClose)));
    }

    #[test]
    fn normalize_prefers_siblings() {
        let mut dom = Dom::new();
        let (_root, a, b) = flat(&mut dom);
        let mut range = BoundaryRange::select_node(b);
        range.normalize(&dom);
        assert_eq!(range.start(), Some(BoundaryPoint::new(a, Boundary::AfterClose)));
    }
}
