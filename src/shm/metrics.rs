//! Performance metrics block
//!
//! A fixed-layout array of 32-bit atomic counters, grouped by the thread
//! that owns (writes) each group. Any peer may read any counter at any
//! time; writes within a group come from exactly one thread, so plain
//! relaxed increments are sufficient.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::layout::METRICS_SIZE;

/// Shared metrics counters.
///
/// Layout: [0-16] render thread, [17] control thread, [18-20] reply
/// reader, [21-22] debug reader, [23-31] reserved.
#[repr(C, align(8))]
pub struct MetricsBlock {
    // Render thread (written from the audio callback)
    pub process_count: AtomicU32,
    pub messages_processed: AtomicU32,
    pub messages_dropped: AtomicU32,
    pub scheduler_queue_depth: AtomicU32,
    pub scheduler_queue_max: AtomicU32,
    pub scheduler_queue_dropped: AtomicU32,
    pub scheduler_lates: AtomicU32,
    pub scheduler_max_late_ms: AtomicU32,
    pub scheduler_last_late_ms: AtomicU32,
    pub scheduler_last_late_tick: AtomicU32,
    pub sequence_gaps: AtomicU32,
    pub in_ring_used: AtomicU32,
    pub in_ring_peak: AtomicU32,
    pub out_ring_used: AtomicU32,
    pub out_ring_peak: AtomicU32,
    pub dbg_ring_used: AtomicU32,
    pub dbg_ring_peak: AtomicU32,

    // Control thread (command producer)
    pub messages_sent: AtomicU32,

    // Reply reader (control side, drains OUT)
    pub replies_received: AtomicU32,
    pub reply_bytes_read: AtomicU32,
    pub reply_reader_wakeups: AtomicU32,

    // Debug reader (control side, drains DBG)
    pub debug_lines_received: AtomicU32,
    pub debug_bytes_read: AtomicU32,

    _reserved: [AtomicU32; 9],
}

const _: () = assert!(std::mem::size_of::<MetricsBlock>() == METRICS_SIZE as usize);

impl MetricsBlock {
    /// Zero every counter. Called once from init.
    pub fn reset(&self) {
        // Counters are a contiguous array of u32; reuse that.
        let words = METRICS_SIZE as usize / 4;
        let base = self as *const Self as *const AtomicU32;
        for i in 0..words {
            unsafe { (*base.add(i)).store(0, Ordering::Relaxed) };
        }
    }

    /// Record a dropped inbound or outbound frame
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish an instantaneous ring usage figure and fold it into its peak
    pub fn publish_ring_usage(used: &AtomicU32, peak: &AtomicU32, bytes: u32) {
        used.store(bytes, Ordering::Relaxed);
        peak.fetch_max(bytes, Ordering::Relaxed);
    }

    /// Publish scheduler depth and fold it into the monotonic maximum
    pub fn publish_scheduler_depth(&self, depth: u32) {
        self.scheduler_queue_depth.store(depth, Ordering::Relaxed);
        self.scheduler_queue_max.fetch_max(depth, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_block_size() {
        assert_eq!(std::mem::size_of::<MetricsBlock>(), 128);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let block: MetricsBlock = unsafe { std::mem::zeroed() };
        block.messages_processed.store(17, Ordering::Relaxed);
        block.scheduler_queue_max.store(9, Ordering::Relaxed);
        block.reset();
        assert_eq!(block.messages_processed.load(Ordering::Relaxed), 0);
        assert_eq!(block.scheduler_queue_max.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_scheduler_depth_peak_is_monotonic() {
        let block: MetricsBlock = unsafe { std::mem::zeroed() };
        block.publish_scheduler_depth(4);
        block.publish_scheduler_depth(2);
        assert_eq!(block.scheduler_queue_depth.load(Ordering::Relaxed), 2);
        assert_eq!(block.scheduler_queue_max.load(Ordering::Relaxed), 4);
    }
}
