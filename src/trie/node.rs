use serde::{Deserialize, Serialize};
use crate::core::types::PartId;

/// Stable handle of a node inside its shard (byte offset of its slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    pub fn offset(&self) -> usize {
        self.0 as usize
    }
}

/// Absolute address of a node: shard plus handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeLoc {
    pub part: PartId,
    pub handle: NodeHandle,
}

impl NodeLoc {
    pub fn new(part: PartId, handle: NodeHandle) -> Self {
        NodeLoc { part, handle }
    }
}

/// Edge target, relative to the shard that owns the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Local(NodeHandle),
    External { part: PartId, handle: NodeHandle },
}

impl NodeRef {
    /// Reference to `target` as seen from a node stored in `owner`
    pub fn between(owner: PartId, target: NodeLoc) -> NodeRef {
        if owner == target.part {
            NodeRef::Local(target.handle)
        } else {
            NodeRef::External {
                part: target.part,
                handle: target.handle,
            }
        }
    }

    pub fn resolve(&self, owner: PartId) -> NodeLoc {
        match *self {
            NodeRef::Local(handle) => NodeLoc::new(owner, handle),
            NodeRef::External { part, handle } => NodeLoc::new(part, handle),
        }
    }

    /// Re-express a reference owned by `from` so that it is valid inside `to`
    pub fn rebase(&self, from: PartId, to: PartId) -> NodeRef {
        NodeRef::between(to, self.resolve(from))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub label: Vec<u8>,
    /// None for an edge that ends a word
    pub target: Option<NodeRef>,
}

impl Child {
    pub fn leaf(label: &[u8]) -> Self {
        Child {
            label: label.to_vec(),
            target: None,
        }
    }

    pub fn new(label: &[u8], target: Option<NodeRef>) -> Self {
        Child {
            label: label.to_vec(),
            target,
        }
    }
}

/// Trie node; children are sorted by label and disjoint at the first byte
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub children: Vec<Child>,
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    /// Child sharing the longest common prefix with `s`, and that prefix length
    pub fn longest_match(&self, s: &[u8]) -> Option<(usize, usize)> {
        let first = *s.first()?;
        let idx = self
            .children
            .binary_search_by(|c| c.label.first().copied().unwrap_or(0).cmp(&first))
            .ok()?;
        let len = common_prefix_len(&self.children[idx].label, s);
        if len == 0 {
            return None;
        }
        Some((idx, len))
    }

    pub fn insert_child(&mut self, child: Child) {
        let pos = self
            .children
            .partition_point(|c| c.label.as_slice() < child.label.as_slice());
        self.children.insert(pos, child);
    }

    pub fn sort_children(&mut self) {
        self.children.sort_by(|a, b| a.label.cmp(&b.label));
    }

    /// Rewrite every edge target after the node moved from `from` to `to`
    pub fn rebase(&mut self, from: PartId, to: PartId) {
        for child in &mut self.children {
            if let Some(target) = child.target {
                child.target = Some(target.rebase(from, to));
            }
        }
    }
}

pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
