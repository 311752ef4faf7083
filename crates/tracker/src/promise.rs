//! Side table for deferred original-sibling searches.
//!
//! A promise records that `origin` is still searching for its original
//! sibling in direction `dir`. While parked, the promise id appears in two
//! slots: the origin's `original[dir]` (the holder awaiting the answer) and
//! the frontier record's `mutated[dir]` (the placement the search resumes
//! from when that slot is revealed). `ptr` is the frontier; it is `None`
//! while a search is being advanced within one engine call.

use std::collections::HashMap;

use dom::NodeId;

use crate::position::{PromiseId, Side};

#[derive(Clone, Copy, Debug)]
pub(crate) struct SiblingPromise {
    pub origin: NodeId,
    pub dir: Side,
    pub ptr: Option<NodeId>,
}

#[derive(Debug, Default)]
pub(crate) struct PromiseTable {
    entries: HashMap<PromiseId, SiblingPromise>,
    next_id: PromiseId,
}

impl PromiseTable {
    pub fn create(&mut self, origin: NodeId, dir: Side) -> PromiseId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.insert(
            id,
            SiblingPromise {
                origin,
                dir,
                ptr: None,
            },
        );
        id
    }

    pub fn get(&self, id: PromiseId) -> Option<SiblingPromise> {
        self.entries.get(&id).copied()
    }

    pub fn set_ptr(&mut self, id: PromiseId, ptr: Option<NodeId>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.ptr = ptr;
        } else {
            debug_assert!(false, "set_ptr on a resolved promise");
        }
    }

    pub fn remove(&mut self, id: PromiseId) -> Option<SiblingPromise> {
        self.entries.remove(&id)
    }

    #[cfg(debug_assertions)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[cfg(debug_assertions)]
    pub fn iter(&self) -> impl Iterator<Item = (PromiseId, SiblingPromise)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }
}
