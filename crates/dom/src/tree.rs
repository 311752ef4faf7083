use std::sync::Arc;

pub type RawId = u32;

/// Handle for a node owned by a [`Dom`] arena. Stable for the arena's
/// lifetime; detaching a node does not invalidate its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub RawId);

#[derive(Clone, Debug)]
pub enum NodeData {
    Element {
        name: Arc<str>,
        // Kept as Vec to preserve source order; use helpers for lookups.
        attributes: Vec<(Arc<str>, String)>,
    },
    Text {
        text: String,
    },
}

#[derive(Clone, Debug)]
struct NodeEntry {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
pub enum DomError {
    MissingNode(NodeId),
    AlreadyAttached(NodeId),
    Detached(NodeId),
    CycleDetected { parent: NodeId, child: NodeId },
    NotAnElement(NodeId),
    NotAText(NodeId),
}

/// Arena-backed tree. Nodes are created once and live as long as the arena;
/// `remove` only detaches, so orphan subtrees keep their identity and can be
/// re-attached later.
#[derive(Clone, Debug, Default)]
pub struct Dom {
    nodes: Vec<NodeEntry>,
}

const NO_CHILDREN: &[NodeId] = &[];

impl Dom {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element {
            name: Arc::from(name),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text {
            text: text.to_string(),
        })
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as RawId);
        self.nodes.push(NodeEntry {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn entry(&self, node: NodeId) -> Option<&NodeEntry> {
        self.nodes.get(node.0 as usize)
    }

    fn entry_mut(&mut self, node: NodeId) -> Option<&mut NodeEntry> {
        self.nodes.get_mut(node.0 as usize)
    }

    fn checked(&self, node: NodeId) -> Result<&NodeEntry, DomError> {
        self.entry(node).ok_or(DomError::MissingNode(node))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.entry(node).and_then(|e| e.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.entry(node).map_or(NO_CHILDREN, |e| &e.children)
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        match &self.entry(node)?.data {
            NodeData::Element { name, .. } => Some(name),
            NodeData::Text { .. } => None,
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.entry(node)?.data {
            NodeData::Text { text } => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.entry(node)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k.as_ref() == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text { .. } => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> &[(Arc<str>, String)] {
        match self.entry(node).map(|e| &e.data) {
            Some(NodeData::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    fn index_of(&self, node: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(node)?;
        let idx = self.children(parent).iter().position(|c| *c == node)?;
        Some((parent, idx))
    }

    pub fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, idx) = self.index_of(node)?;
        if idx == 0 {
            None
        } else {
            Some(self.children(parent)[idx - 1])
        }
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, idx) = self.index_of(node)?;
        self.children(parent).get(idx + 1).copied()
    }

    /// Root of the tree `node` currently belongs to (`node` itself when
    /// detached).
    pub fn top(&self, node: NodeId) -> NodeId {
        let mut cur = node;
        while let Some(p) = self.parent(cur) {
            cur = p;
        }
        cur
    }

    /// Inclusive containment: `contains(n, n)` is true.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Detaches `node` from its parent. The subtree below it stays intact.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.checked(node)?;
        let Some((parent, idx)) = self.index_of(node) else {
            debug_assert!(false, "remove of a detached node");
            return Err(DomError::Detached(node));
        };
        if let Some(entry) = self.entry_mut(parent) {
            entry.children.remove(idx);
        }
        if let Some(entry) = self.entry_mut(node) {
            entry.parent = None;
        }
        Ok(())
    }

    pub fn insert_before(&mut self, next: NodeId, node: NodeId) -> Result<(), DomError> {
        let Some((parent, idx)) = self.index_of(next) else {
            debug_assert!(false, "insert_before anchor is detached");
            return Err(DomError::Detached(next));
        };
        self.attach(parent, idx, node)
    }

    pub fn insert_after(&mut self, prev: NodeId, node: NodeId) -> Result<(), DomError> {
        let Some((parent, idx)) = self.index_of(prev) else {
            debug_assert!(false, "insert_after anchor is detached");
            return Err(DomError::Detached(prev));
        };
        self.attach(parent, idx + 1, node)
    }

    pub fn append(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        let len = self.checked(parent)?.children.len();
        self.attach(parent, len, node)
    }

    pub fn prepend(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        self.checked(parent)?;
        self.attach(parent, 0, node)
    }

    fn attach(&mut self, parent: NodeId, idx: usize, node: NodeId) -> Result<(), DomError> {
        self.checked(node)?;
        if !matches!(self.checked(parent)?.data, NodeData::Element { .. }) {
            debug_assert!(false, "parent node cannot have children");
            return Err(DomError::NotAnElement(parent));
        }
        if self.parent(node).is_some() {
            debug_assert!(false, "node already has a parent");
            return Err(DomError::AlreadyAttached(node));
        }
        if self.contains(node, parent) {
            debug_assert!(false, "cannot create cycle");
            return Err(DomError::CycleDetected {
                parent,
                child: node,
            });
        }
        if let Some(entry) = self.entry_mut(parent) {
            entry.children.insert(idx, node);
        }
        if let Some(entry) = self.entry_mut(node) {
            entry.parent = Some(parent);
        }
        Ok(())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let Some(entry) = self.entry_mut(node) else {
            return Err(DomError::MissingNode(node));
        };
        match &mut entry.data {
            NodeData::Element { attributes, .. } => {
                if let Some(slot) = attributes.iter_mut().find(|(k, _)| k.as_ref() == name) {
                    slot.1.clear();
                    slot.1.push_str(value);
                } else {
                    attributes.push((Arc::from(name), value.to_string()));
                }
                Ok(())
            }
            NodeData::Text { .. } => {
                debug_assert!(false, "set_attribute on a text node");
                Err(DomError::NotAnElement(node))
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<(), DomError> {
        let Some(entry) = self.entry_mut(node) else {
            return Err(DomError::MissingNode(node));
        };
        match &mut entry.data {
            NodeData::Element { attributes, .. } => {
                attributes.retain(|(k, _)| k.as_ref() != name);
                Ok(())
            }
            NodeData::Text { .. } => {
                debug_assert!(false, "remove_attribute on a text node");
                Err(DomError::NotAnElement(node))
            }
        }
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) -> Result<(), DomError> {
        let Some(entry) = self.entry_mut(node) else {
            return Err(DomError::MissingNode(node));
        };
        match &mut entry.data {
            NodeData::Text { text } => {
                text.clear();
                text.push_str(value);
                Ok(())
            }
            NodeData::Element { .. } => {
                debug_assert!(false, "set_text on an element");
                Err(DomError::NotAText(node))
            }
        }
    }
}
