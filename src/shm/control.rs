//! Control block: ring indices, sequence counters and status flags

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::layout::CONTROL_SIZE;

/// Producer write failed because a ring was full
pub const STATUS_BUFFER_FULL: u32 = 1 << 0;
/// Render-side drain hit its per-quantum cap with frames still pending
pub const STATUS_OVERRUN: u32 = 1 << 1;
/// Engine construction failed; rendering is a no-op
pub const STATUS_ENGINE_ERROR: u32 = 1 << 2;
/// A frame declared a length the consumer refuses to honor
pub const STATUS_FRAGMENTED_MSG: u32 = 1 << 3;

/// Atomic ring indices and status flags shared between threads.
///
/// Head indices are written by the producer of the respective ring, tail
/// indices by its consumer. Sequence counters are owned by each ring's
/// producer and stamped into every frame. Status flags are set by either
/// side and cleared only by the control thread.
#[repr(C, align(8))]
pub struct ControlBlock {
    pub in_head: AtomicI32,
    pub in_tail: AtomicI32,
    pub out_head: AtomicI32,
    pub out_tail: AtomicI32,
    pub dbg_head: AtomicI32,
    pub dbg_tail: AtomicI32,
    pub in_sequence: AtomicU32,
    pub out_sequence: AtomicU32,
    pub dbg_sequence: AtomicU32,
    pub status_flags: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() == CONTROL_SIZE as usize);

impl ControlBlock {
    /// Reset all indices, counters and flags. Called once from init.
    pub fn reset(&self) {
        self.in_head.store(0, Ordering::Relaxed);
        self.in_tail.store(0, Ordering::Relaxed);
        self.out_head.store(0, Ordering::Relaxed);
        self.out_tail.store(0, Ordering::Relaxed);
        self.dbg_head.store(0, Ordering::Relaxed);
        self.dbg_tail.store(0, Ordering::Relaxed);
        self.in_sequence.store(0, Ordering::Relaxed);
        self.out_sequence.store(0, Ordering::Relaxed);
        self.dbg_sequence.store(0, Ordering::Relaxed);
        self.status_flags.store(0, Ordering::Relaxed);
    }

    /// OR a status flag into the shared flags word
    pub fn raise(&self, flag: u32) {
        self.status_flags.fetch_or(flag, Ordering::Relaxed);
    }

    /// Current status flags
    pub fn status(&self) -> u32 {
        self.status_flags.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_block_size() {
        assert_eq!(std::mem::size_of::<ControlBlock>(), 40);
    }

    #[test]
    fn test_raise_accumulates_flags() {
        let block: ControlBlock = unsafe { std::mem::zeroed() };
        block.raise(STATUS_BUFFER_FULL);
        block.raise(STATUS_FRAGMENTED_MSG);
        assert_eq!(block.status(), STATUS_BUFFER_FULL | STATUS_FRAGMENTED_MSG);
    }
}
