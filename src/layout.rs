//! Compile-time layout of the shared memory region
//!
//! Every sub-region lives at a fixed offset from the region base so the
//! control thread can locate rings, counters and the node mirror without
//! duplicating declarations. Change the SIZE constants; all offsets are
//! derived. The [`BufferLayout`] descriptor exports the whole map through
//! a single accessor (see [`crate::ffi::get_buffer_layout`]).

use serde::{Deserialize, Serialize};

/// Frames rendered per callback (audio quantum)
pub const FRAMES_PER_QUANTUM: usize = 128;

/// Frame header size in bytes (magic, length, sequence, reserved)
pub const HEADER_SIZE: u32 = 16;

/// Magic stamped into every valid ring frame
pub const MESSAGE_MAGIC: u32 = 0xDEAD_BEEF;

/// Magic of the header-only padding sentinel at a ring's tail
pub const PADDING_MAGIC: u32 = 0xBADD_CAFE;

// User-configurable region sizes.
// IN is large (graph definitions arrive inline); OUT and DBG are smaller.
pub const IN_RING_SIZE: u32 = 768 * 1024;
pub const OUT_RING_SIZE: u32 = 128 * 1024;
pub const DBG_RING_SIZE: u32 = 64 * 1024;

/// Control block: ring indices, per-ring sequence counters, status flags
pub const CONTROL_SIZE: u32 = 40;

/// Metrics block: 32 atomic 32-bit counters
pub const METRICS_SIZE: u32 = 128;

/// Node-mirror capacity (entries)
pub const NODE_TREE_MAX_NODES: u32 = 1024;
/// Bytes per mirror entry
pub const NODE_ENTRY_SIZE: u32 = 56;
/// Mirror header bytes (count, version, dropped + pad)
pub const NODE_TREE_HEADER_SIZE: u32 = 16;
pub const NODE_TREE_SIZE: u32 = NODE_TREE_HEADER_SIZE + NODE_TREE_MAX_NODES * NODE_ENTRY_SIZE;

/// Time-base block: start seconds (f64 bits), drift ms, global ms
pub const TIME_SIZE: u32 = 16;

/// Capture ring capacity in frames
pub const CAPTURE_MAX_FRAMES: u32 = 65_536;
/// Channels interleaved into the capture region
pub const CAPTURE_CHANNELS: u32 = 2;
/// Capture header bytes (enabled, head, sample rate, channels)
pub const CAPTURE_HEADER_SIZE: u32 = 16;
pub const CAPTURE_SIZE: u32 = CAPTURE_HEADER_SIZE + CAPTURE_MAX_FRAMES * CAPTURE_CHANNELS * 4;

/// Engine option slots written by the control thread before init
pub const OPTION_SLOTS: usize = 16;
pub const OPTIONS_SIZE: u32 = (OPTION_SLOTS as u32) * 4;

// Derived offsets. Do not edit — computed from the sizes above.
pub const IN_RING_START: u32 = 0;
pub const OUT_RING_START: u32 = IN_RING_START + IN_RING_SIZE;
pub const DBG_RING_START: u32 = OUT_RING_START + OUT_RING_SIZE;
pub const CONTROL_START: u32 = DBG_RING_START + DBG_RING_SIZE;
pub const METRICS_START: u32 = CONTROL_START + CONTROL_SIZE;
pub const NODE_TREE_START: u32 = METRICS_START + METRICS_SIZE;
pub const TIME_START: u32 = NODE_TREE_START + NODE_TREE_SIZE;
pub const CAPTURE_START: u32 = TIME_START + TIME_SIZE;
pub const OPTIONS_START: u32 = CAPTURE_START + CAPTURE_SIZE;

/// Total region size (for validation and allocation)
pub const TOTAL_REGION_SIZE: u32 = OPTIONS_START + OPTIONS_SIZE;

/// Region base alignment (the TIME block holds f64 bits)
pub const REGION_ALIGN: usize = 8;

/// Largest payload a single inbound frame may carry
pub const MAX_PAYLOAD: u32 = IN_RING_SIZE - HEADER_SIZE;

// Every block that holds 8-byte atomics must land 8-aligned.
const _: () = assert!(CONTROL_START % 8 == 0);
const _: () = assert!(METRICS_START % 8 == 0);
const _: () = assert!(NODE_TREE_START % 8 == 0);
const _: () = assert!(TIME_START % 8 == 0);
const _: () = assert!(CAPTURE_START % 8 == 0);
const _: () = assert!(OPTIONS_START % 8 == 0);
const _: () = assert!(NODE_ENTRY_SIZE % 4 == 0);

/// Exported layout descriptor
///
/// The control thread reads this once at initialization so both sides of
/// the boundary share a single source of truth for the memory map.
#[repr(C)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferLayout {
    pub in_ring_start: u32,
    pub in_ring_size: u32,
    pub out_ring_start: u32,
    pub out_ring_size: u32,
    pub dbg_ring_start: u32,
    pub dbg_ring_size: u32,
    pub control_start: u32,
    pub control_size: u32,
    pub metrics_start: u32,
    pub metrics_size: u32,
    pub node_tree_start: u32,
    pub node_tree_size: u32,
    pub node_tree_max_nodes: u32,
    pub time_start: u32,
    pub time_size: u32,
    pub capture_start: u32,
    pub capture_size: u32,
    pub capture_max_frames: u32,
    pub options_start: u32,
    pub options_size: u32,
    pub total_size: u32,
    pub max_payload: u32,
    pub message_magic: u32,
    pub padding_magic: u32,
}

/// Compile-time constant instance of the layout descriptor
pub const BUFFER_LAYOUT: BufferLayout = BufferLayout {
    in_ring_start: IN_RING_START,
    in_ring_size: IN_RING_SIZE,
    out_ring_start: OUT_RING_START,
    out_ring_size: OUT_RING_SIZE,
    dbg_ring_start: DBG_RING_START,
    dbg_ring_size: DBG_RING_SIZE,
    control_start: CONTROL_START,
    control_size: CONTROL_SIZE,
    metrics_start: METRICS_START,
    metrics_size: METRICS_SIZE,
    node_tree_start: NODE_TREE_START,
    node_tree_size: NODE_TREE_SIZE,
    node_tree_max_nodes: NODE_TREE_MAX_NODES,
    time_start: TIME_START,
    time_size: TIME_SIZE,
    capture_start: CAPTURE_START,
    capture_size: CAPTURE_SIZE,
    capture_max_frames: CAPTURE_MAX_FRAMES,
    options_start: OPTIONS_START,
    options_size: OPTIONS_SIZE,
    total_size: TOTAL_REGION_SIZE,
    max_payload: MAX_PAYLOAD,
    message_magic: MESSAGE_MAGIC,
    padding_magic: PADDING_MAGIC,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_are_contiguous() {
        assert_eq!(OUT_RING_START, IN_RING_SIZE);
        assert_eq!(DBG_RING_START, OUT_RING_START + OUT_RING_SIZE);
        assert_eq!(TOTAL_REGION_SIZE, OPTIONS_START + OPTIONS_SIZE);
    }

    #[test]
    fn test_layout_descriptor_matches_constants() {
        assert_eq!(BUFFER_LAYOUT.in_ring_size, IN_RING_SIZE);
        assert_eq!(BUFFER_LAYOUT.total_size, TOTAL_REGION_SIZE);
        assert_eq!(BUFFER_LAYOUT.message_magic, 0xDEAD_BEEF);
        assert_eq!(BUFFER_LAYOUT.padding_magic, 0xBADD_CAFE);
    }

    #[test]
    fn test_node_tree_sizing() {
        assert_eq!(
            NODE_TREE_SIZE,
            NODE_TREE_HEADER_SIZE + NODE_TREE_MAX_NODES * NODE_ENTRY_SIZE
        );
    }
}
