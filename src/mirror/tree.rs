//! Shared node-tree entries and the render-side mirror

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::{
    engine::NodeDesc,
    layout::{NODE_ENTRY_SIZE, NODE_TREE_HEADER_SIZE, NODE_TREE_MAX_NODES},
    mirror::index::NodeIndex,
    shm::SharedRegion,
};

/// def_name capacity including the NUL terminator
pub const DEF_NAME_SIZE: usize = 32;

/// Mirror header, polled by observers for change detection.
///
/// `version` increments on every structural change with release ordering;
/// observers read it before and after a snapshot and retry on mismatch.
/// `dropped_count` tracks nodes the engine has that the mirror does not
/// (the mirror is lossy by design when full).
#[repr(C, align(8))]
pub struct NodeTreeHeader {
    pub node_count: AtomicU32,
    pub version: AtomicU32,
    pub dropped_count: AtomicU32,
    _pad: u32,
}

const _: () = assert!(std::mem::size_of::<NodeTreeHeader>() == NODE_TREE_HEADER_SIZE as usize);

/// One mirror entry, 56 bytes.
///
/// Numeric fields are atomics so lifecycle updates are data-race free;
/// `def_name` is written only while a slot is being (re)filled and read
/// under the observer's version-retry contract, which tolerates tears.
/// Slots are never reshuffled, so indices stay stable; `id == -1` marks
/// an empty slot.
#[repr(C)]
pub struct NodeEntry {
    pub id: AtomicI32,
    pub parent_id: AtomicI32,
    pub is_group: AtomicI32,
    pub prev_id: AtomicI32,
    pub next_id: AtomicI32,
    pub head_id: AtomicI32,
    def_name: UnsafeCell<[u8; DEF_NAME_SIZE]>,
}

const _: () = assert!(std::mem::size_of::<NodeEntry>() == NODE_ENTRY_SIZE as usize);

impl NodeEntry {
    fn write_name(&self, name: &str) {
        let mut buf = [0u8; DEF_NAME_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(DEF_NAME_SIZE - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        unsafe { *self.def_name.get() = buf };
    }

    /// Copy of the NUL-terminated definition name bytes
    pub fn def_name(&self) -> [u8; DEF_NAME_SIZE] {
        unsafe { *self.def_name.get() }
    }

    /// Definition name as a str, up to the first NUL
    pub fn name_str(&self) -> String {
        let bytes = self.def_name();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(DEF_NAME_SIZE);
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }
}

/// Render-side owner of the mirror: O(1) slot allocation from a free-list
/// stack and O(1) id lookup through the hash index. All methods run on
/// the render thread, driven by the engine's lifecycle callbacks.
pub struct NodeMirror {
    header: NonNull<NodeTreeHeader>,
    entries: NonNull<NodeEntry>,
    capacity: usize,
    free: Vec<i16>,
    index: NodeIndex,
}

// Points into the shared region, which outlives the core that owns both.
unsafe impl Send for NodeMirror {}

impl NodeMirror {
    /// Bind to the region's mirror blocks and reset every entry to empty
    pub fn new(region: &SharedRegion) -> Self {
        let capacity = NODE_TREE_MAX_NODES as usize;
        let mirror = Self {
            header: NonNull::new(region.node_header() as *const _ as *mut NodeTreeHeader)
                .expect("region pointers are non-null"),
            entries: NonNull::new(region.node_entries()).expect("region pointers are non-null"),
            capacity,
            free: (0..capacity as i16).rev().collect(),
            index: NodeIndex::new(),
        };
        for slot in 0..capacity {
            mirror.entry(slot as i16).id.store(-1, Ordering::Relaxed);
        }
        mirror
    }

    fn header(&self) -> &NodeTreeHeader {
        unsafe { self.header.as_ref() }
    }

    fn entry(&self, slot: i16) -> &NodeEntry {
        debug_assert!((slot as usize) < self.capacity);
        unsafe { &*self.entries.as_ptr().add(slot as usize) }
    }

    fn bump_version(&self) {
        self.header().version.fetch_add(1, Ordering::Release);
    }

    /// Free slots remaining
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Slot index for a live node id
    pub fn slot_of(&self, id: i32) -> Option<i16> {
        self.index.get(id)
    }

    /// Reflect a node creation.
    ///
    /// On a full mirror the node is dropped (counted); the engine's own
    /// tree is unaffected.
    pub fn add(&mut self, node: &NodeDesc<'_>) {
        if node.id < 0 {
            // Auto-assigned internal ids stay out of the mirror.
            return;
        }
        let Some(slot) = self.free.pop() else {
            self.header().dropped_count.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let entry = self.entry(slot);
        entry.parent_id.store(node.parent_id, Ordering::Relaxed);
        entry
            .is_group
            .store(if node.is_group { 1 } else { 0 }, Ordering::Relaxed);
        entry.prev_id.store(node.prev_id, Ordering::Relaxed);
        entry.next_id.store(node.next_id, Ordering::Relaxed);
        entry.head_id.store(
            if node.is_group { node.head_id } else { -1 },
            Ordering::Relaxed,
        );
        entry.write_name(if node.is_group { "group" } else { node.def_name });
        entry.id.store(node.id, Ordering::Relaxed);

        self.index.insert(node.id, slot);

        if node.prev_id != -1 {
            if let Some(prev) = self.index.get(node.prev_id) {
                self.entry(prev).next_id.store(node.id, Ordering::Relaxed);
            }
        }
        if node.next_id != -1 {
            if let Some(next) = self.index.get(node.next_id) {
                self.entry(next).prev_id.store(node.id, Ordering::Relaxed);
            }
        }
        if node.parent_id != -1 && node.prev_id == -1 {
            if let Some(parent) = self.index.get(node.parent_id) {
                self.entry(parent).head_id.store(node.id, Ordering::Relaxed);
            }
        }

        self.header().node_count.fetch_add(1, Ordering::Relaxed);
        self.bump_version();
    }

    /// Reflect a node removal.
    ///
    /// An id missing from the mirror was dropped on insert; the drop
    /// balance is decremented instead.
    pub fn remove(&mut self, id: i32) {
        let Some(slot) = self.index.remove(id) else {
            let header = self.header();
            if header.dropped_count.load(Ordering::Relaxed) > 0 {
                header.dropped_count.fetch_sub(1, Ordering::Relaxed);
            }
            return;
        };

        let entry = self.entry(slot);
        let prev_id = entry.prev_id.load(Ordering::Relaxed);
        let next_id = entry.next_id.load(Ordering::Relaxed);
        let parent_id = entry.parent_id.load(Ordering::Relaxed);

        if prev_id != -1 {
            if let Some(prev) = self.index.get(prev_id) {
                self.entry(prev).next_id.store(next_id, Ordering::Relaxed);
            }
        }
        if next_id != -1 {
            if let Some(next) = self.index.get(next_id) {
                self.entry(next).prev_id.store(prev_id, Ordering::Relaxed);
            }
        }
        if parent_id != -1 && prev_id == -1 {
            if let Some(parent) = self.index.get(parent_id) {
                self.entry(parent).head_id.store(next_id, Ordering::Relaxed);
            }
        }

        entry.id.store(-1, Ordering::Relaxed);
        self.free.push(slot);

        let header = self.header();
        if header.node_count.load(Ordering::Relaxed) > 0 {
            header.node_count.fetch_sub(1, Ordering::Relaxed);
        }
        self.bump_version();
    }

    /// Reflect a node move: patch the old neighborhood out, the new one in
    pub fn update(&mut self, node: &NodeDesc<'_>) {
        let Some(slot) = self.index.get(node.id) else {
            // Moved before we ever saw it; treat as an add.
            self.add(node);
            return;
        };

        let entry = self.entry(slot);
        let old_prev = entry.prev_id.load(Ordering::Relaxed);
        let old_next = entry.next_id.load(Ordering::Relaxed);
        let old_parent = entry.parent_id.load(Ordering::Relaxed);

        entry.parent_id.store(node.parent_id, Ordering::Relaxed);
        entry.prev_id.store(node.prev_id, Ordering::Relaxed);
        entry.next_id.store(node.next_id, Ordering::Relaxed);
        if node.is_group {
            entry.head_id.store(node.head_id, Ordering::Relaxed);
        }

        if old_prev != -1 {
            if let Some(prev) = self.index.get(old_prev) {
                self.entry(prev).next_id.store(old_next, Ordering::Relaxed);
            }
        }
        if old_next != -1 {
            if let Some(next) = self.index.get(old_next) {
                self.entry(next).prev_id.store(old_prev, Ordering::Relaxed);
            }
        }
        if old_parent != -1 && old_prev == -1 {
            if let Some(parent) = self.index.get(old_parent) {
                let parent_entry = self.entry(parent);
                if parent_entry.head_id.load(Ordering::Relaxed) == node.id {
                    parent_entry.head_id.store(old_next, Ordering::Relaxed);
                }
            }
        }

        if node.prev_id != -1 {
            if let Some(prev) = self.index.get(node.prev_id) {
                self.entry(prev).next_id.store(node.id, Ordering::Relaxed);
            }
        }
        if node.next_id != -1 {
            if let Some(next) = self.index.get(node.next_id) {
                self.entry(next).prev_id.store(node.id, Ordering::Relaxed);
            }
        }
        if node.parent_id != -1 && node.prev_id == -1 {
            if let Some(parent) = self.index.get(node.parent_id) {
                self.entry(parent).head_id.store(node.id, Ordering::Relaxed);
            }
        }

        self.bump_version();
    }
}
