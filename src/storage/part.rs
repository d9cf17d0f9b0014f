use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::PartId;
use crate::storage::grow_policy::GrowPolicy;
use crate::trie::node::{Node, NodeHandle};

pub const HEADER_SIZE: usize = 256;
pub const NUM_CLASSES: usize = 20;

const SLOT_SIZE: usize = 16;
const ALIGN: usize = 16;
const MIN_BLOCK: usize = 16;
const MAGIC: [u8; 4] = *b"FZPT";

/// Fixed header at the start of every shard file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub capacity: u64,   // Mapped length, fixed at creation
    pub bump: u64,       // First never-allocated byte
    pub live_nodes: u64,
    pub free_bytes: u64, // Bytes parked on the free lists
    pub free_slots: u64, // Head of the free slot list, 0 = empty
    pub free_blocks: [u64; NUM_CLASSES],
}

impl PartHeader {
    pub const VERSION: u32 = 1;

    fn new(capacity: usize) -> Self {
        PartHeader {
            magic: MAGIC,
            version: Self::VERSION,
            capacity: capacity as u64,
            bump: HEADER_SIZE as u64,
            live_nodes: 0,
            free_bytes: 0,
            free_slots: 0,
            free_blocks: [0; NUM_CLASSES],
        }
    }
}

/// Snapshot of a shard's occupancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartStats {
    pub id: PartId,
    pub capacity: usize,
    pub used: usize,
    pub free: usize,
    pub live_nodes: u64,
}

// [ HEADER (256 bytes) ]
// [ slot | block | block | slot | ... ]   <- bump allocated, 16-byte aligned
// A slot is (block offset u64, block capacity u32, record length u32).
// A node's handle is the offset of its slot, so the record can move to a
// bigger block without the handle changing.
#[derive(Debug, Clone, Copy)]
struct Slot {
    block: u64,
    cap: u32,
    len: u32,
}

struct Arena {
    mmap: MmapMut,
    header: PartHeader,
}

/// One memory-mapped shard holding a node arena
pub struct Part {
    pub id: PartId,
    pub path: PathBuf,
    policy: Arc<dyn GrowPolicy>,
    arena: RwLock<Arena>,
}

impl Part {
    pub fn open_or_create<P: AsRef<Path>>(path: P, id: PartId, policy: Arc<dyn GrowPolicy>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path, id, policy)
        } else {
            Self::create(path, id, policy)
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, id: PartId, policy: Arc<dyn GrowPolicy>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(Error::corrupted(format!("Part {} is truncated ({} bytes)", path.display(), len)));
        }

        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        let header: PartHeader = bincode::deserialize(&mmap[..HEADER_SIZE])?;

        if header.magic != MAGIC {
            return Err(Error::corrupted(format!("Part {} has a bad magic number", path.display())));
        }
        if header.version != PartHeader::VERSION {
            return Err(Error::corrupted(format!(
                "Part {} has format version {}, expecting {}",
                path.display(),
                header.version,
                PartHeader::VERSION
            )));
        }
        if header.capacity as usize != len || header.bump > header.capacity {
            return Err(Error::corrupted(format!("Part {} header does not match its size", path.display())));
        }

        debug!("Opened part {} ({} live nodes)", path.display(), header.live_nodes);
        Ok(Part {
            id,
            path: path.to_path_buf(),
            policy,
            arena: RwLock::new(Arena { mmap, header }),
        })
    }

    /// Create a new shard file. The file only appears under `path` once its
    /// header is fully written.
    pub fn create<P: AsRef<Path>>(path: P, id: PartId, policy: Arc<dyn GrowPolicy>) -> Result<Self> {
        let path = path.as_ref();
        let capacity = policy.initial_size();
        if capacity < HEADER_SIZE + 4 * SLOT_SIZE || capacity > u32::MAX as usize {
            return Err(Error::new(
                ErrorKind::Configuration,
                format!("Shard size {} is out of range", capacity),
            ));
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(dir)?;
        temp.as_file().set_len(capacity as u64)?;

        let mut mmap = unsafe { MmapOptions::new().len(capacity).map_mut(temp.as_file())? };
        let header = PartHeader::new(capacity);
        bincode::serialize_into(&mut mmap[..HEADER_SIZE], &header)?;
        mmap.flush()?;

        temp.persist_noclobber(path)?;
        info!("Created part {} ({} bytes)", path.display(), capacity);

        Ok(Part {
            id,
            path: path.to_path_buf(),
            policy,
            arena: RwLock::new(Arena { mmap, header }),
        })
    }

    /// Store `node` in a new slot. Returns None when the shard is exhausted
    /// and the node has to go elsewhere.
    pub fn allocate_node(&self, node: &Node) -> Result<Option<NodeHandle>> {
        let data = bincode::serialize(node)?;
        let mut arena = self.arena.write();
        if !self.has_room(&arena)? {
            return Ok(None);
        }

        let Some(slot_off) = arena.alloc_slot() else {
            return Ok(None);
        };
        let class = class_for(data.len())?;
        let Some(block) = arena.alloc_block(class) else {
            arena.release_slot(slot_off);
            arena.sync_header()?;
            return Ok(None);
        };

        arena.mmap[block..block + data.len()].copy_from_slice(&data);
        arena.write_slot(slot_off, Slot {
            block: block as u64,
            cap: block_size(class) as u32,
            len: data.len() as u32,
        });
        arena.header.live_nodes += 1;
        arena.sync_header()?;

        Ok(Some(NodeHandle(slot_off as u32)))
    }

    pub fn resolve(&self, handle: NodeHandle) -> Result<Node> {
        let arena = self.arena.read();
        let slot = arena.live_slot(handle, self.id)?;
        let start = slot.block as usize;
        let node = bincode::deserialize(&arena.mmap[start..start + slot.len as usize])?;
        Ok(node)
    }

    /// Overwrite the record behind `handle`. Returns false if the record no
    /// longer fits and the shard has no room to move it; nothing is changed
    /// in that case.
    pub fn write_node(&self, handle: NodeHandle, node: &Node) -> Result<bool> {
        let data = bincode::serialize(node)?;
        let mut arena = self.arena.write();
        let slot = arena.live_slot(handle, self.id)?;

        if data.len() <= slot.cap as usize {
            let start = slot.block as usize;
            arena.mmap[start..start + data.len()].copy_from_slice(&data);
            arena.write_slot(handle.offset(), Slot { len: data.len() as u32, ..slot });
            return Ok(true);
        }

        if !self.has_room(&arena)? {
            return Ok(false);
        }
        let class = class_for(data.len())?;
        let Some(block) = arena.alloc_block(class) else {
            return Ok(false);
        };

        arena.mmap[block..block + data.len()].copy_from_slice(&data);
        arena.write_slot(handle.offset(), Slot {
            block: block as u64,
            cap: block_size(class) as u32,
            len: data.len() as u32,
        });
        arena.release_block(slot.block as usize, slot.cap as usize);
        arena.sync_header()?;
        Ok(true)
    }

    pub fn free_node(&self, handle: NodeHandle) -> Result<()> {
        let mut arena = self.arena.write();
        let slot = arena.live_slot(handle, self.id)?;
        arena.release_block(slot.block as usize, slot.cap as usize);
        arena.release_slot(handle.offset());
        arena.header.live_nodes -= 1;
        arena.sync_header()
    }

    pub fn live_nodes(&self) -> u64 {
        self.arena.read().header.live_nodes
    }

    pub fn stats(&self) -> PartStats {
        let arena = self.arena.read();
        PartStats {
            id: self.id,
            capacity: arena.header.capacity as usize,
            used: arena.header.bump as usize,
            free: arena.free(),
            live_nodes: arena.header.live_nodes,
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.arena.read().mmap.flush()?;
        Ok(())
    }

    fn has_room(&self, arena: &Arena) -> Result<bool> {
        let capacity = arena.header.capacity as usize;
        if self.policy.should_grow(capacity, arena.free()) {
            if let Some(target) = self.policy.grow(capacity) {
                return Err(Error::new(
                    ErrorKind::Configuration,
                    format!(
                        "Part {} asks to grow from {} to {} bytes, shards cannot grow in place",
                        self.id.value(),
                        capacity,
                        target
                    ),
                ));
            }
            return Ok(false);
        }
        Ok(true)
    }
}

impl Drop for Part {
    fn drop(&mut self) {
        if let Err(e) = self.arena.get_mut().mmap.flush() {
            warn!("Failed to flush part {}: {}", self.path.display(), e);
        }
    }
}

impl Arena {
    fn free(&self) -> usize {
        (self.header.capacity - self.header.bump + self.header.free_bytes) as usize
    }

    fn sync_header(&mut self) -> Result<()> {
        bincode::serialize_into(&mut self.mmap[..HEADER_SIZE], &self.header)?;
        Ok(())
    }

    fn read_u64(&self, off: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.mmap[off..off + 8]);
        u64::from_le_bytes(buf)
    }

    fn write_u64(&mut self, off: usize, value: u64) {
        self.mmap[off..off + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn read_slot(&self, off: usize) -> Slot {
        let mut cap = [0u8; 4];
        let mut len = [0u8; 4];
        cap.copy_from_slice(&self.mmap[off + 8..off + 12]);
        len.copy_from_slice(&self.mmap[off + 12..off + 16]);
        Slot {
            block: self.read_u64(off),
            cap: u32::from_le_bytes(cap),
            len: u32::from_le_bytes(len),
        }
    }

    fn write_slot(&mut self, off: usize, slot: Slot) {
        self.write_u64(off, slot.block);
        self.mmap[off + 8..off + 12].copy_from_slice(&slot.cap.to_le_bytes());
        self.mmap[off + 12..off + 16].copy_from_slice(&slot.len.to_le_bytes());
    }

    /// Slot behind a handle, or a consistency error if it is not a live node
    fn live_slot(&self, handle: NodeHandle, part: PartId) -> Result<Slot> {
        let off = handle.offset();
        let bump = self.header.bump as usize;
        if off < HEADER_SIZE || off % ALIGN != 0 || off + SLOT_SIZE > bump {
            return Err(Error::corrupted(format!(
                "Dangling node handle {} in part {}",
                off,
                part.value()
            )));
        }
        let slot = self.read_slot(off);
        let end = slot.block as usize + slot.cap as usize;
        if slot.cap == 0 || end > bump || slot.len > slot.cap {
            return Err(Error::corrupted(format!(
                "Node handle {} in part {} does not point at a live node",
                off,
                part.value()
            )));
        }
        Ok(slot)
    }

    fn bump_alloc(&mut self, size: usize) -> Option<usize> {
        let start = self.header.bump as usize;
        let end = start.checked_add(size)?;
        if end > self.header.capacity as usize {
            return None;
        }
        self.header.bump = end as u64;
        Some(start)
    }

    fn alloc_slot(&mut self) -> Option<usize> {
        let head = self.header.free_slots as usize;
        if head != 0 {
            self.header.free_slots = self.read_u64(head);
            self.header.free_bytes -= SLOT_SIZE as u64;
            return Some(head);
        }
        self.bump_alloc(SLOT_SIZE)
    }

    fn release_slot(&mut self, off: usize) {
        let next = self.header.free_slots;
        self.write_slot(off, Slot { block: next, cap: 0, len: 0 });
        self.header.free_slots = off as u64;
        self.header.free_bytes += SLOT_SIZE as u64;
    }

    fn alloc_block(&mut self, class: usize) -> Option<usize> {
        let size = block_size(class);
        let head = self.header.free_blocks[class] as usize;
        if head != 0 {
            self.header.free_blocks[class] = self.read_u64(head);
            self.header.free_bytes -= size as u64;
            return Some(head);
        }
        self.bump_alloc(size)
    }

    fn release_block(&mut self, off: usize, size: usize) {
        let class = size.trailing_zeros() as usize - MIN_BLOCK.trailing_zeros() as usize;
        let next = self.header.free_blocks[class];
        self.write_u64(off, next);
        self.header.free_blocks[class] = off as u64;
        self.header.free_bytes += size as u64;
    }
}

fn block_size(class: usize) -> usize {
    MIN_BLOCK << class
}

fn class_for(len: usize) -> Result<usize> {
    let size = len.max(MIN_BLOCK).next_power_of_two();
    let class = (size.trailing_zeros() - MIN_BLOCK.trailing_zeros()) as usize;
    if class >= NUM_CLASSES {
        return Err(Error::new(
            ErrorKind::Configuration,
            format!("Node record of {} bytes exceeds the largest block size", len),
        ));
    }
    Ok(class)
}
