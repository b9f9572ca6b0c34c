//! Single-producer ring writer

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::{
    layout::HEADER_SIZE,
    ring::frame::FrameHeader,
    shm::{ControlBlock, MetricsBlock, RingId, SharedRegion, STATUS_BUFFER_FULL},
};

/// Wait-free framed writer for one SPSC ring.
///
/// The writer loads both indices with acquire semantics, frames the
/// payload, and publishes the new head with a release store, so a consumer
/// that observes the head also observes the header and payload bytes.
/// Failure is always soft: the frame is dropped, the BUFFER_FULL status
/// bit raised and the drop counter incremented.
pub struct RingWriter<'a> {
    base: *mut u8,
    capacity: u32,
    head: &'a AtomicI32,
    tail: &'a AtomicI32,
    sequence: &'a AtomicU32,
    control: &'a ControlBlock,
    metrics: Option<&'a MetricsBlock>,
}

impl<'a> RingWriter<'a> {
    /// Writer for the given ring, with drop accounting bound to the
    /// region's metrics block.
    pub fn new(region: &'a SharedRegion, id: RingId) -> Self {
        Self::with_metrics(region, id, Some(region.metrics()))
    }

    /// Writer without metrics binding (a missing binding is not an error)
    pub fn unmetered(region: &'a SharedRegion, id: RingId) -> Self {
        Self::with_metrics(region, id, None)
    }

    /// Writer over caller-provided storage and indices, for harnesses
    /// that exercise ring behavior at small capacities.
    ///
    /// # Safety
    /// `base` must point to `capacity` writable bytes that outlive the
    /// writer, and the head/tail/sequence triple must belong to that
    /// storage's single producer/consumer pair.
    pub unsafe fn from_raw(
        base: *mut u8,
        capacity: u32,
        head: &'a AtomicI32,
        tail: &'a AtomicI32,
        sequence: &'a AtomicU32,
        control: &'a ControlBlock,
        metrics: Option<&'a MetricsBlock>,
    ) -> Self {
        Self {
            base,
            capacity,
            head,
            tail,
            sequence,
            control,
            metrics,
        }
    }

    fn with_metrics(
        region: &'a SharedRegion,
        id: RingId,
        metrics: Option<&'a MetricsBlock>,
    ) -> Self {
        let ring = region.ring(id);
        let control = region.control();
        let (head, tail, sequence) = match id {
            RingId::Inbound => (&control.in_head, &control.in_tail, &control.in_sequence),
            RingId::Reply => (&control.out_head, &control.out_tail, &control.out_sequence),
            RingId::Debug => (&control.dbg_head, &control.dbg_tail, &control.dbg_sequence),
        };
        Self {
            base: ring.base,
            capacity: ring.capacity,
            head,
            tail,
            sequence,
            control,
            metrics,
        }
    }

    /// Ring capacity in bytes
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Bytes currently occupied by unconsumed frames
    pub fn used_bytes(&self) -> u32 {
        let head = self.head.load(Ordering::Acquire) as u32;
        let tail = self.tail.load(Ordering::Acquire) as u32;
        head.wrapping_sub(tail) % self.capacity
    }

    fn fail(&self) -> bool {
        self.control.raise(STATUS_BUFFER_FULL);
        if let Some(metrics) = self.metrics {
            metrics.record_dropped();
        }
        false
    }

    /// Append `payload` as one framed record. Returns false if the frame
    /// was dropped for lack of space.
    pub fn write(&self, payload: &[u8]) -> bool {
        let payload_len = payload.len() as u32;
        if payload_len > self.capacity - HEADER_SIZE {
            // Programmer bug; report by failing, never by panicking.
            return self.fail();
        }
        let frame_len = HEADER_SIZE + payload_len;

        let mut head = self.head.load(Ordering::Acquire) as u32;
        let tail = self.tail.load(Ordering::Acquire) as u32;

        let free = (self.capacity - 1 - head).wrapping_add(tail) % self.capacity;
        if free < frame_len {
            return self.fail();
        }

        let space_to_end = self.capacity - head;
        if frame_len > space_to_end {
            // The frame must start over at offset 0. That start is only
            // safe while it stays strictly below the consumer's tail: the
            // raw free-byte count alone admits wraps that overwrite
            // unread frames or park head on tail.
            if frame_len >= tail {
                return self.fail();
            }
            if space_to_end >= HEADER_SIZE {
                let sentinel = FrameHeader::padding().to_bytes();
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        sentinel.as_ptr(),
                        self.base.add(head as usize),
                        HEADER_SIZE as usize,
                    );
                }
            } else {
                unsafe {
                    std::ptr::write_bytes(self.base.add(head as usize), 0, space_to_end as usize);
                }
            }
            head = 0;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let header = FrameHeader::message(payload_len, sequence).to_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(
                header.as_ptr(),
                self.base.add(head as usize),
                HEADER_SIZE as usize,
            );
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.base.add((head + HEADER_SIZE) as usize),
                payload.len(),
            );
        }

        self.head
            .store(((head + frame_len) % self.capacity) as i32, Ordering::Release);
        true
    }
}
