//! The node tree.
//!
//! A [`Document`] owns a flat array of nodes linked by parent, first-child,
//! last-child and next-sibling handles. The root is implicit: it has no name
//! or value and exists even in an empty document, which owns no memory.
//!
//! Text form, one top-level node per line:
//!
//! ```text
//! ; comment to end of line
//! (config "v1" (server (port "8080")) (debug))
//! ```

use std::fmt;
use std::path::Path;

use crate::error::TreeError;
use crate::memory::guard_out_of_memory;
use crate::parse;
use crate::string::{HookString, escape};
use crate::vec::HookVec;

/// Handle to a node of one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// The implicit root every document has.
    pub const ROOT: Self = Self(0);

    fn from_index(index: usize) -> Result<Self, TreeError> {
        index
            .checked_add(1)
            .and_then(|raw| u32::try_from(raw).ok())
            .map(Self)
            .ok_or(TreeError::OutOfMemory)
    }

    fn index(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

struct Node {
    name: HookString,
    value: HookString,
    parent: NodeId,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    fn try_clone(&self) -> Result<Self, TreeError> {
        Ok(Self {
            name: self.name.try_clone()?,
            value: self.value.try_clone()?,
            parent: self.parent,
            first_child: self.first_child,
            last_child: self.last_child,
            next_sibling: self.next_sibling,
        })
    }
}

#[derive(Default)]
pub struct Document {
    nodes: HookVec<Node>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
}

/// True when `name` can be written and read back by the text format.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(parse::is_name_char)
}

impl Document {
    /// An empty document. Allocates nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            nodes: HookVec::new(),
            first_child: None,
            last_child: None,
        }
    }

    /// Number of nodes, not counting the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()?)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()?)
    }

    fn contains(&self, id: NodeId) -> bool {
        id == NodeId::ROOT || self.node(id).is_some()
    }

    /// Append a new last child named `name` under `parent`.
    pub fn append_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::InvalidNode);
        }
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName);
        }
        guard_out_of_memory(|| {
            let name = HookString::try_from_str(name)?;
            let id = NodeId::from_index(self.nodes.len())?;
            self.nodes.try_reserve(1)?;
            self.nodes.try_push(Node {
                name,
                value: HookString::new(),
                parent,
                first_child: None,
                last_child: None,
                next_sibling: None,
            })?;
            self.link_last_child(parent, id);
            Ok(id)
        })
    }

    fn link_last_child(&mut self, parent: NodeId, child: NodeId) {
        let previous = self.last_child(parent);
        if let Some(previous) = previous.and_then(|p| self.node_mut(p)) {
            previous.next_sibling = Some(child);
        }
        let (first, last) = if parent == NodeId::ROOT {
            (&mut self.first_child, &mut self.last_child)
        } else {
            match self.node_mut(parent) {
                Some(node) => (&mut node.first_child, &mut node.last_child),
                None => return,
            }
        };
        if first.is_none() {
            *first = Some(child);
        }
        *last = Some(child);
    }

    /// Rename `node`.
    pub fn set_name(&mut self, node: NodeId, name: &str) -> Result<(), TreeError> {
        if !is_valid_name(name) {
            return Err(TreeError::InvalidName);
        }
        self.replace_text(node, name, |node| &mut node.name)
    }

    /// Replace the value of `node`. An empty value owns no memory.
    pub fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), TreeError> {
        self.replace_text(node, value, |node| &mut node.value)
    }

    pub(crate) fn set_value_string(
        &mut self,
        node: NodeId,
        value: HookString,
    ) -> Result<(), TreeError> {
        let slot = self.node_mut(node).ok_or(TreeError::InvalidNode)?;
        slot.value = value;
        Ok(())
    }

    fn replace_text(
        &mut self,
        node: NodeId,
        text: &str,
        field: fn(&mut Node) -> &mut HookString,
    ) -> Result<(), TreeError> {
        if self.node(node).is_none() {
            return Err(TreeError::InvalidNode);
        }
        let text = guard_out_of_memory(|| HookString::try_from_str(text))?;
        let slot = self.node_mut(node).ok_or(TreeError::InvalidNode)?;
        *field(slot) = text;
        Ok(())
    }

    /// Name of `node`; empty for the root or an unknown handle.
    #[must_use]
    pub fn name(&self, node: NodeId) -> &str {
        self.node(node).map_or("", |node| node.name.as_str())
    }

    /// Value of `node`; empty for the root or an unknown handle.
    #[must_use]
    pub fn value(&self, node: NodeId) -> &str {
        self.node(node).map_or("", |node| node.value.as_str())
    }

    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).map(|node| node.parent)
    }

    #[must_use]
    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        if node == NodeId::ROOT {
            self.first_child
        } else {
            self.node(node)?.first_child
        }
    }

    fn last_child(&self, node: NodeId) -> Option<NodeId> {
        if node == NodeId::ROOT {
            self.last_child
        } else {
            self.node(node)?.last_child
        }
    }

    #[must_use]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.next_sibling
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.first_child(node),
        }
    }

    /// First child of `parent` named `name`.
    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).find(|&id| self.name(id) == name)
    }

    /// Deep copy. On failure the partial copy is released and `self` is
    /// untouched.
    pub fn try_clone(&self) -> Result<Self, TreeError> {
        guard_out_of_memory(|| {
            let mut nodes = HookVec::try_with_capacity(self.nodes.len())?;
            for node in &self.nodes {
                nodes.try_push(node.try_clone()?)?;
            }
            Ok(Self {
                nodes,
                first_child: self.first_child,
                last_child: self.last_child,
            })
        })
    }

    /// Build a document from its text form.
    pub fn parse(text: &str) -> Result<Self, TreeError> {
        guard_out_of_memory(|| {
            let mut doc = Self::new();
            parse::parse_into(&mut doc, text)?;
            Ok(doc)
        })
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    fn write_open(&self, f: &mut fmt::Formatter<'_>, node: NodeId) -> fmt::Result {
        write!(f, "({}", self.name(node))?;
        let value = self.value(node);
        if !value.is_empty() {
            f.write_str(" \"")?;
            for c in value.chars() {
                match escape(c) {
                    Some(seq) => f.write_str(seq)?,
                    None => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        Ok(())
    }

    fn write_subtree(&self, f: &mut fmt::Formatter<'_>, top: NodeId) -> fmt::Result {
        let mut node = top;
        loop {
            self.write_open(f, node)?;
            if let Some(child) = self.first_child(node) {
                f.write_str(" ")?;
                node = child;
                continue;
            }
            loop {
                f.write_str(")")?;
                if node == top {
                    return Ok(());
                }
                if let Some(next) = self.next_sibling(node) {
                    f.write_str(" ")?;
                    node = next;
                    break;
                }
                node = self.parent(node).unwrap_or(top);
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for top in self.children(NodeId::ROOT) {
            self.write_subtree(f, top)?;
            f.write_str("\n")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.len())
            .field("text", &self.to_string())
            .finish()
    }
}

/// Iterator over the children of one node, in order.
pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.doc.next_sibling(id);
        Some(id)
    }
}
