use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info, warn};
use parking_lot::RwLock;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Key, PartId, strip_terminator, validate_key, with_terminator};
use crate::storage::grow_policy::GrowPolicy;
use crate::storage::head::{read_head, write_head};
use crate::storage::layout::TrieLayout;
use crate::storage::part::{HEADER_SIZE, Part, PartStats};
use crate::trie::node::{Child, Node, NodeHandle, NodeLoc, NodeRef};

/// Occupancy of every shard plus the root location
#[derive(Debug, Clone)]
pub struct TrieStats {
    pub head: NodeLoc,
    pub current_part: PartId,
    pub parts: Vec<PartStats>,
}

impl TrieStats {
    pub fn live_nodes(&self) -> u64 {
        self.parts.iter().map(|p| p.live_nodes).sum()
    }
}

/// Radix trie over terminated byte strings, stored across memory-mapped shards
pub struct Trie {
    layout: TrieLayout,
    policy: Arc<dyn GrowPolicy>,
    parts: RwLock<HashMap<PartId, Arc<Part>>>,
    /// Shard that receives nodes displaced from exhausted shards
    current_part: PartId,
    head: NodeLoc,
}

impl Trie {
    pub fn open<P: AsRef<Path>>(dir: P, policy: Arc<dyn GrowPolicy>) -> Result<Self> {
        let layout = TrieLayout::new(dir)?;
        let mut existing = layout.find_parts()?;
        let head = read_head(&layout.head_path())?;

        if head.is_none() && !existing.is_empty() {
            if !is_unseeded(&layout, &existing, &policy)? {
                return Err(Error::corrupted(format!(
                    "{} has shard files but no HEAD",
                    layout.base_dir.display()
                )));
            }
            // Initialization stopped before HEAD was written
            warn!("Reinitializing {}, its only shard holds an empty root", layout.base_dir.display());
            fs::remove_file(layout.part_path(PartId(0)))?;
            existing.clear();
        }

        let mut trie = Trie {
            current_part: existing.last().copied().unwrap_or(PartId(0)),
            layout,
            policy,
            parts: RwLock::new(HashMap::new()),
            head: NodeLoc::new(PartId(0), NodeHandle(0)),
        };

        match head {
            Some(head) => {
                trie.resolve(head)?;
                trie.head = head;
                debug!("Opened trie at {} with head {}:{}", trie.dir().display(), head.part.0, head.handle.0);
            }
            None => {
                let root = trie.allocate(&Node::new(), PartId(0), Some(PartId(0)))?;
                write_head(&trie.layout.head_path(), root)?;
                trie.head = root;
                info!("Initialized trie at {}", trie.dir().display());
            }
        }

        Ok(trie)
    }

    pub fn dir(&self) -> &PathBuf {
        &self.layout.base_dir
    }

    pub fn head(&self) -> NodeLoc {
        self.head
    }

    pub fn current_part(&self) -> PartId {
        self.current_part
    }

    /// Open a shard, creating its file if asked to
    pub(crate) fn load_part(&self, id: PartId, create_if_missing: bool) -> Result<Arc<Part>> {
        if let Some(part) = self.parts.read().get(&id) {
            return Ok(Arc::clone(part));
        }

        let mut parts = self.parts.write();
        if let Some(part) = parts.get(&id) {
            return Ok(Arc::clone(part));
        }

        let path = self.layout.part_path(id);
        if !create_if_missing && !path.exists() {
            return Err(Error::corrupted(format!(
                "Part {:04} not found in {}",
                id.0,
                self.layout.base_dir.display()
            )));
        }
        let part = Arc::new(Part::open_or_create(&path, id, Arc::clone(&self.policy))?);
        parts.insert(id, Arc::clone(&part));
        Ok(part)
    }

    pub(crate) fn resolve(&self, loc: NodeLoc) -> Result<Node> {
        self.load_part(loc.part, false)?.resolve(loc.handle)
    }

    /// Store a node whose edges are expressed relative to `owner`. Tries
    /// `preferred` first, then the current part, moving on to fresh shards
    /// until one has room.
    fn allocate(&mut self, node: &Node, owner: PartId, preferred: Option<PartId>) -> Result<NodeLoc> {
        if let Some(id) = preferred {
            if let Some(loc) = self.try_allocate(id, node, owner)? {
                return Ok(loc);
            }
        }

        loop {
            let id = self.current_part;
            let pristine = self.load_part(id, true)?.stats().used == HEADER_SIZE;
            if let Some(loc) = self.try_allocate(id, node, owner)? {
                return Ok(loc);
            }
            if pristine {
                return Err(Error::new(
                    ErrorKind::Configuration,
                    format!("Node does not fit into an empty part {:04}", id.0),
                ));
            }
            self.current_part = id.next();
            info!("Switching current part to {:04}", self.current_part.0);
        }
    }

    fn try_allocate(&self, id: PartId, node: &Node, owner: PartId) -> Result<Option<NodeLoc>> {
        let part = self.load_part(id, true)?;
        let handle = if id == owner {
            part.allocate_node(node)?
        } else {
            let mut moved = node.clone();
            moved.rebase(owner, id);
            part.allocate_node(&moved)?
        };
        Ok(handle.map(|h| NodeLoc::new(id, h)))
    }

    fn set_head(&mut self, head: NodeLoc) -> Result<()> {
        write_head(&self.layout.head_path(), head)?;
        info!("Root of {} moved to {:04}:{}", self.dir().display(), head.part.0, head.handle.0);
        self.head = head;
        Ok(())
    }

    pub fn insert(&mut self, key: &[u8]) -> Result<()> {
        validate_key(key)?;
        let word = with_terminator(key);

        // (node, child index) pairs from the root down to the current node
        let mut path: Vec<(NodeLoc, usize)> = Vec::new();
        let mut loc = self.head;
        let mut pos = 0;

        loop {
            let mut node = self.resolve(loc)?;
            let rest = &word[pos..];

            let Some((idx, len)) = node.longest_match(rest) else {
                node.insert_child(Child::leaf(rest));
                return self.store(loc, node, path);
            };

            if len == rest.len() {
                // Already present
                return Ok(());
            }

            let child = &node.children[idx];
            if len == child.label.len() {
                let target = child.target.ok_or_else(|| {
                    Error::corrupted(format!(
                        "Key {:?} has a proper prefix in the trie",
                        String::from_utf8_lossy(key)
                    ))
                })?;
                path.push((loc, idx));
                loc = target.resolve(loc.part);
                pos += len;
                continue;
            }

            // Split the edge at the common prefix
            let mut split = Node::new();
            split.children.push(Child::new(&child.label[len..], child.target));
            split.children.push(Child::leaf(&rest[len..]));
            split.sort_children();

            let split_loc = self.allocate(&split, loc.part, Some(loc.part))?;
            let child = &mut node.children[idx];
            child.label.truncate(len);
            child.target = Some(NodeRef::between(loc.part, split_loc));
            if let Err(e) = self.store(loc, node, path) {
                self.release(&[split_loc]);
                return Err(e);
            }
            return Ok(());
        }
    }

    /// Write back a modified node. If its shard has no room the node moves
    /// to another shard and the parent edge is rewritten, repeating up to
    /// the root; a moved root updates HEAD. On failure every copy made so
    /// far is freed and the trie is left as it was.
    fn store(&mut self, loc: NodeLoc, node: Node, path: Vec<(NodeLoc, usize)>) -> Result<()> {
        let mut copies = Vec::new();
        match self.write_back(loc, node, path, &mut copies) {
            Ok(retired) => {
                for old in retired {
                    self.load_part(old.part, false)?.free_node(old.handle)?;
                }
                Ok(())
            }
            Err(e) => {
                self.release(&copies);
                Err(e)
            }
        }
    }

    /// Returns the locations the chain moved away from
    fn write_back(
        &mut self,
        loc: NodeLoc,
        node: Node,
        mut path: Vec<(NodeLoc, usize)>,
        copies: &mut Vec<NodeLoc>,
    ) -> Result<Vec<NodeLoc>> {
        let mut loc = loc;
        let mut node = node;
        let mut retired = Vec::new();

        loop {
            if self.load_part(loc.part, false)?.write_node(loc.handle, &node)? {
                break;
            }

            let moved = self.allocate(&node, loc.part, None)?;
            copies.push(moved);
            debug!(
                "Moved node {:04}:{} to {:04}:{}",
                loc.part.0, loc.handle.0, moved.part.0, moved.handle.0
            );
            retired.push(loc);

            match path.pop() {
                None => {
                    self.set_head(moved)?;
                    break;
                }
                Some((parent, idx)) => {
                    let mut parent_node = self.resolve(parent)?;
                    parent_node.children[idx].target = Some(NodeRef::between(parent.part, moved));
                    loc = parent;
                    node = parent_node;
                }
            }
        }

        Ok(retired)
    }

    /// Free nodes allocated by an insert that did not complete
    fn release(&self, locs: &[NodeLoc]) {
        for &loc in locs {
            let freed = self
                .load_part(loc.part, false)
                .and_then(|part| part.free_node(loc.handle));
            if let Err(e) = freed {
                warn!("Could not release node {:04}:{}: {}", loc.part.0, loc.handle.0, e);
            }
        }
    }

    pub fn search_exact(&self, key: &[u8]) -> Result<Vec<Key>> {
        validate_key(key)?;
        let word = with_terminator(key);
        let mut loc = self.head;
        let mut pos = 0;

        loop {
            let node = self.resolve(loc)?;
            let rest = &word[pos..];
            let Some((idx, len)) = node.longest_match(rest) else {
                return Ok(Vec::new());
            };

            let child = &node.children[idx];
            if len < child.label.len() {
                return Ok(Vec::new());
            }
            if len == rest.len() {
                return Ok(vec![strip_terminator(&word).to_vec()]);
            }
            match child.target {
                Some(target) => {
                    loc = target.resolve(loc.part);
                    pos += len;
                }
                None => return Ok(Vec::new()),
            }
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(!self.search_exact(key)?.is_empty())
    }

    /// Every stored key, sorted
    pub fn keys(&self) -> Result<Vec<Key>> {
        let mut keys = Vec::new();
        let mut stack: Vec<(NodeLoc, Vec<u8>)> = vec![(self.head, Vec::new())];

        while let Some((loc, prefix)) = stack.pop() {
            let node = self.resolve(loc)?;
            for child in &node.children {
                let mut word = prefix.clone();
                word.extend_from_slice(&child.label);
                match child.target {
                    Some(target) => stack.push((target.resolve(loc.part), word)),
                    None => keys.push(strip_terminator(&word).to_vec()),
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Number of nodes reachable from HEAD, root included
    pub fn reachable_nodes(&self) -> Result<u64> {
        let mut count = 0;
        let mut stack = vec![self.head];

        while let Some(loc) = stack.pop() {
            count += 1;
            let node = self.resolve(loc)?;
            for child in &node.children {
                if let Some(target) = child.target {
                    stack.push(target.resolve(loc.part));
                }
            }
        }

        Ok(count)
    }

    /// Occupancy of every shard file in the directory
    pub fn part_stats(&self) -> Result<Vec<PartStats>> {
        let mut parts = Vec::new();
        for id in self.layout.find_parts()? {
            parts.push(self.load_part(id, false)?.stats());
        }
        Ok(parts)
    }

    pub fn stats(&self) -> Result<TrieStats> {
        Ok(TrieStats {
            head: self.head,
            current_part: self.current_part,
            parts: self.part_stats()?,
        })
    }

    pub fn flush(&self) -> Result<()> {
        for part in self.parts.read().values() {
            part.flush()?;
        }
        Ok(())
    }
}

/// A lone shard 0 whose root, always the first slot, is still empty
fn is_unseeded(layout: &TrieLayout, existing: &[PartId], policy: &Arc<dyn GrowPolicy>) -> Result<bool> {
    if existing != [PartId(0)] {
        return Ok(false);
    }
    let part = Part::open(layout.part_path(PartId(0)), PartId(0), Arc::clone(policy))?;
    Ok(match part.live_nodes() {
        0 => true,
        1 => part
            .resolve(NodeHandle(HEADER_SIZE as u32))
            .is_ok_and(|root| root.children.is_empty()),
        _ => false,
    })
}
