//! Attribute, character-data and custom property cache.
//!
//! Each entry stores the value captured the first time the property was
//! reported; later reports never change it, they only recompute the dirty
//! flag against the current value. Clean entries must survive until
//! `synchronize` certifies that no retrospective report is still in flight,
//! because a later report's old value is the only way to notice a revert.

use std::collections::HashMap;

use dom::{Dom, DomError, NodeId};

/// Key of a native property: the character data of a text node, or one
/// attribute. Namespaced attribute names arrive already joined as
/// `"ns:name"` by the observer adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeKey {
    Data,
    Attribute(String),
}

#[derive(Clone, Debug)]
struct Entry {
    /// First reported old value; `None` means the attribute was absent.
    value: Option<String>,
    dirty: bool,
}

#[derive(Debug, Default)]
struct NodeProps {
    native: HashMap<NativeKey, Entry>,
    custom: HashMap<String, Entry>,
}

impl NodeProps {
    fn is_empty(&self) -> bool {
        self.native.is_empty() && self.custom.is_empty()
    }

    fn any_dirty(&self) -> bool {
        self.native.values().chain(self.custom.values()).any(|e| e.dirty)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PropertyTracker {
    nodes: HashMap<NodeId, NodeProps>,
    dirty: usize,
}

fn mark_entry<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, Entry>,
    key: K,
    new_value: Option<&str>,
    old_value: Option<&str>,
    dirty: &mut usize,
) {
    match map.entry(key) {
        std::collections::hash_map::Entry::Vacant(slot) => {
            let is_dirty = new_value != old_value;
            slot.insert(Entry {
                value: old_value.map(str::to_string),
                dirty: is_dirty,
            });
            if is_dirty {
                *dirty += 1;
            }
        }
        std::collections::hash_map::Entry::Occupied(mut slot) => {
            let entry = slot.get_mut();
            let is_dirty = new_value != entry.value.as_deref();
            if is_dirty != entry.dirty {
                entry.dirty = is_dirty;
                if is_dirty {
                    *dirty += 1;
                } else {
                    *dirty -= 1;
                }
            }
        }
    }
}

impl PropertyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_count() > 0
    }

    pub fn node_dirty(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(NodeProps::any_dirty)
    }

    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, props)| props.any_dirty())
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    pub fn mark_native(
        &mut self,
        node: NodeId,
        key: NativeKey,
        new_value: Option<&str>,
        old_value: Option<&str>,
    ) {
        let props = self.nodes.entry(node).or_default();
        mark_entry(&mut props.native, key, new_value, old_value, &mut self.dirty);
    }

    pub fn mark_custom(
        &mut self,
        node: NodeId,
        key: &str,
        new_value: Option<&str>,
        old_value: Option<&str>,
    ) {
        let props = self.nodes.entry(node).or_default();
        mark_entry(
            &mut props.custom,
            key.to_string(),
            new_value,
            old_value,
            &mut self.dirty,
        );
    }

    pub fn dirty_natives(&self, node: NodeId) -> impl Iterator<Item = (&NativeKey, Option<&str>)> {
        self.nodes
            .get(&node)
            .into_iter()
            .flat_map(|props| props.native.iter())
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, entry)| (key, entry.value.as_deref()))
    }

    pub fn dirty_customs(&self, node: NodeId) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.nodes
            .get(&node)
            .into_iter()
            .flat_map(|props| props.custom.iter())
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, entry)| (key.as_str(), entry.value.as_deref()))
    }

    /// Drops every clean entry; only values that still differ from their
    /// originals stay cached. Returns the remaining dirty count.
    pub fn synchronize(&mut self) -> usize {
        for props in self.nodes.values_mut() {
            props.native.retain(|_, entry| entry.dirty);
            props.custom.retain(|_, entry| entry.dirty);
        }
        self.nodes.retain(|_, props| !props.is_empty());
        self.dirty
    }

    /// Writes the stored originals back through the tree's property APIs;
    /// custom entries go through the caller's hook when one is given.
    pub fn revert_all(
        &mut self,
        dom: &mut Dom,
        mut custom_set: Option<&mut dyn FnMut(NodeId, &str, Option<&str>)>,
    ) -> Result<(), DomError> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        for node in ids {
            let Some(props) = self.nodes.get(&node) else {
                continue;
            };
            let mut natives: Vec<(NativeKey, Option<String>)> = props
                .native
                .iter()
                .filter(|(_, e)| e.dirty)
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect();
            natives.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in natives {
                match key {
                    NativeKey::Data => dom.set_text(node, value.as_deref().unwrap_or(""))?,
                    NativeKey::Attribute(name) => match value {
                        Some(v) => dom.set_attribute(node, &name, &v)?,
                        None => dom.remove_attribute(node, &name)?,
                    },
                }
            }
            if let Some(set) = custom_set.as_deref_mut() {
                let mut customs: Vec<(String, Option<String>)> = props
                    .custom
                    .iter()
                    .filter(|(_, e)| e.dirty)
                    .map(|(k, e)| (k.clone(), e.value.clone()))
                    .collect();
                customs.sort();
                for (key, value) in customs {
                    set(node, &key, value.as_deref());
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.dirty = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32) -> NodeId {
        NodeId(id)
    }

    #[test]
    fn first_report_captures_the_original() {
        let mut props = PropertyTracker::new();
        props.mark_native(
            node(1),
            NativeKey::Attribute("id".into()),
            Some("new"),
            Some("old"),
        );
        assert_eq!(props.dirty_count(), 1);
        let entries: Vec<_> = props.dirty_natives(node(1)).collect();
        assert_eq!(entries, vec![(&NativeKey::Attribute("id".into()), Some("old"))]);
    }

    #[test]
    fn reverted_value_clears_the_dirty_flag() {
        let mut props = PropertyTracker::new();
        let key = NativeKey::Attribute("id".into());
        // old "B" -> current "B_modified"
        props.mark_native(node(1), key.clone(), Some("B_modified"), Some("B"));
        assert!(props.is_dirty());
        // old "B_modified" -> current back to "B": clean against the stored original
        props.mark_native(node(1), key, Some("B"), Some("B_modified"));
        assert!(!props.is_dirty());
        assert!(!props.node_dirty(node(1)));
        assert_eq!(props.synchronize(), 0);
        assert!(props.dirty_nodes().is_empty());
    }

    #[test]
    fn unchanged_report_stays_clean() {
        let mut props = PropertyTracker::new();
        props.mark_native(node(1), NativeKey::Data, Some("same"), Some("same"));
        assert!(!props.is_dirty());
        assert_eq!(props.synchronize(), 0);
    }

    #[test]
    fn custom_entries_are_kept_apart_from_natives() {
        let mut props = PropertyTracker::new();
        props.mark_custom(node(1), "selection", Some("b"), Some("a"));
        props.mark_native(node(1), NativeKey::Data, Some("x"), Some("y"));
        assert_eq!(props.dirty_count(), 2);
        assert_eq!(props.dirty_customs(node(1)).count(), 1);
        assert_eq!(props.dirty_natives(node(1)).count(), 1);
    }

    #[test]
    fn revert_restores_attributes_data_and_customs() {
        let mut dom = Dom::new();
        let root = dom.create_element("root");
        let text = dom.create_text("edited");
        dom.append(root, text).expect("append failed");
        dom.set_attribute(root, "id", "edited").expect("set failed");
        dom.set_attribute(root, "title", "added").expect("set failed");

        let mut props = PropertyTracker::new();
        props.mark_native(
            root,
            NativeKey::Attribute("id".into()),
            Some("edited"),
            Some("orig"),
        );
        props.mark_native(root, NativeKey::Attribute("title".into()), Some("added"), None);
        props.mark_native(text, NativeKey::Data, Some("edited"), Some("orig text"));
        props.mark_custom(root, "checked", Some("yes"), Some("no"));

        let mut seen = Vec::new();
        let mut hook = |n: NodeId, k: &str, v: Option<&str>| {
            seen.push((n, k.to_string(), v.map(str::to_string)));
        };
        props
            .revert_all(&mut dom, Some(&mut hook))
            .expect("revert failed");
        assert_eq!(dom.attr(root, "id"), Some("orig"));
        assert_eq!(dom.attr(root, "title"), None);
        assert_eq!(dom.text(text), Some("orig text"));
        assert_eq!(seen, vec![(root, "checked".to_string(), Some("no".to_string()))]);
    }
}
