//! Reference observed-tree driver.
//!
//! Owns a [`Dom`] and a [`MutationTracker`] and keeps them in lockstep:
//! every mutation method captures the point-in-time neighbourhood, applies
//! the operation, then reports it. This is the adapter contract the core
//! expects from a real observer, and the seam that makes it testable with a
//! synthetic one; out-of-order or unwatched behaviour is exercised by
//! calling the tracker's `record_*` API directly instead.

use dom::{Dom, DomError, NodeId};

use crate::tracker::MutationTracker;

#[derive(Debug, Default)]
pub struct TrackedDom {
    pub dom: Dom,
    pub tracker: MutationTracker,
}

impl TrackedDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts observation at the tree's current state.
    pub fn from_dom(dom: Dom) -> Self {
        Self {
            dom,
            tracker: MutationTracker::new(),
        }
    }

    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.dom.parent(node) else {
            return Err(DomError::Detached(node));
        };
        let prev = self.dom.prev_sibling(node);
        let next = self.dom.next_sibling(node);
        self.dom.remove(node)?;
        self.tracker.record_children(parent, &[node], &[], prev, next);
        Ok(())
    }

    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.dom.parent(anchor) else {
            return Err(DomError::Detached(anchor));
        };
        let prev = self.dom.prev_sibling(anchor);
        self.dom.insert_before(anchor, node)?;
        self.tracker
            .record_children(parent, &[], &[node], prev, Some(anchor));
        Ok(())
    }

    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.dom.parent(anchor) else {
            return Err(DomError::Detached(anchor));
        };
        let next = self.dom.next_sibling(anchor);
        self.dom.insert_after(anchor, node)?;
        self.tracker
            .record_children(parent, &[], &[node], Some(anchor), next);
        Ok(())
    }

    pub fn append(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        let prev = self.dom.children(parent).last().copied();
        self.dom.append(parent, node)?;
        self.tracker.record_children(parent, &[], &[node], prev, None);
        Ok(())
    }

    pub fn prepend(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        let next = self.dom.children(parent).first().copied();
        self.dom.prepend(parent, node)?;
        self.tracker.record_children(parent, &[], &[node], None, next);
        Ok(())
    }

    pub fn set_attribute(&mut self, node: NodeId, key: &str, value: &str) -> Result<(), DomError> {
        let old = self.dom.attr(node, key).map(str::to_string);
        self.dom.set_attribute(node, key, value)?;
        self.tracker
            .record_attribute(&self.dom, node, key, Some(old.as_deref()));
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, key: &str) -> Result<(), DomError> {
        let old = self.dom.attr(node, key).map(str::to_string);
        self.dom.remove_attribute(node, key)?;
        self.tracker
            .record_attribute(&self.dom, node, key, Some(old.as_deref()));
        Ok(())
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let Some(old) = self.dom.text(node).map(str::to_string) else {
            return Err(DomError::NotAText(node));
        };
        self.dom.set_text(node, value)?;
        self.tracker.record_data(&self.dom, node, Some(&old));
        Ok(())
    }
}
