//! Inbound ring consumer (render side)
//!
//! The reader recovers framing from `magic` and `length` alone, resyncs
//! defensively on malformed bytes, and tracks producer sequence numbers so
//! silent frame loss shows up in the gap counter. Consumption is split in
//! two: [`InboundReader::pull`] copies the next valid payload into the
//! caller's scratch without advancing the tail, and
//! [`InboundReader::commit`] publishes the consumption. A dispatcher that
//! hits backpressure simply never commits, leaving the frame — and the
//! sequence tracker — exactly where they were.

use std::sync::atomic::Ordering;

use crate::{
    layout::{HEADER_SIZE, MAX_PAYLOAD},
    ring::frame::FrameHeader,
    shm::{RingId, SharedRegion, STATUS_FRAGMENTED_MSG},
};

/// Sequence numbers wrap at 2^31 (the producer counter is 32-bit signed)
const SEQUENCE_MASK: u32 = 0x7FFF_FFFF;

/// Cap on the contribution of a single gap event to the gap counter
const MAX_GAP_EVENT: u32 = 65_535;

/// A valid frame pulled from the ring, payload already copied to scratch
#[derive(Debug, Clone, Copy)]
pub struct PulledFrame {
    /// Payload bytes now present in the scratch buffer
    pub payload_len: usize,
    /// Total frame length including header
    pub frame_len: u32,
    /// Producer-stamped sequence number
    pub sequence: u32,
    /// Ring offset the frame was read from
    pub tail_pos: u32,
}

/// Outcome of one pull
#[derive(Debug)]
pub enum Pull {
    /// Ring is empty (or held only padding/slack)
    Empty,
    /// A valid frame was copied into the scratch buffer
    Frame(PulledFrame),
}

/// Consumer-side state for the inbound ring
#[derive(Debug, Default)]
pub struct InboundReader {
    last_sequence: Option<u32>,
}

impl InboundReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last observed sequence number.
    ///
    /// Called after a scheduler clear so an external purge of the inbound
    /// ring does not register as a gap.
    pub fn reset_sequence(&mut self) {
        self.last_sequence = None;
    }

    /// Copy the next valid payload into `scratch` without consuming it.
    ///
    /// Padding sentinels, writer slack and malformed frames are skipped
    /// (and counted) internally; only a valid frame or emptiness is
    /// surfaced. `scratch` must hold at least [`MAX_PAYLOAD`] bytes.
    pub fn pull(&mut self, region: &SharedRegion, scratch: &mut [u8]) -> Pull {
        debug_assert!(scratch.len() >= MAX_PAYLOAD as usize);

        let ring = region.ring(RingId::Inbound);
        let control = region.control();
        let metrics = region.metrics();

        loop {
            let head = control.in_head.load(Ordering::Acquire) as u32;
            let tail = control.in_tail.load(Ordering::Relaxed) as u32;
            if head == tail {
                return Pull::Empty;
            }

            let header =
                unsafe { FrameHeader::read_straddled(ring.base, ring.capacity, tail) };
            let space_to_end = ring.capacity - tail;

            // Writer slack: fewer than HEADER_SIZE zero bytes before the
            // end mean the producer wrapped without room for a sentinel.
            if space_to_end < HEADER_SIZE && header.is_zero() {
                control.in_tail.store(0, Ordering::Release);
                continue;
            }

            if header.is_padding() {
                control.in_tail.store(0, Ordering::Release);
                continue;
            }

            if !header.is_message() || header.length < HEADER_SIZE {
                // Unrecognizable bytes: resync one byte at a time.
                control
                    .in_tail
                    .store(((tail + 1) % ring.capacity) as i32, Ordering::Release);
                metrics.record_dropped();
                continue;
            }

            let payload_len = header.length - HEADER_SIZE;
            if payload_len > MAX_PAYLOAD
                || header.length > ring.capacity
                || header.length > space_to_end
            {
                control.raise(STATUS_FRAGMENTED_MSG);
                control.in_tail.store(
                    ((tail + header.length) % ring.capacity) as i32,
                    Ordering::Release,
                );
                metrics.record_dropped();
                continue;
            }

            unsafe {
                std::ptr::copy_nonoverlapping(
                    ring.base.add((tail + HEADER_SIZE) as usize),
                    scratch.as_mut_ptr(),
                    payload_len as usize,
                );
            }

            return Pull::Frame(PulledFrame {
                payload_len: payload_len as usize,
                frame_len: header.length,
                sequence: header.sequence,
                tail_pos: tail,
            });
        }
    }

    /// Consume a previously pulled frame: advance the tail and account
    /// for any sequence gap. Gap accounting happens only here, so a frame
    /// left unconsumed under backpressure is never flagged on re-read.
    pub fn commit(&mut self, region: &SharedRegion, frame: &PulledFrame) {
        let control = region.control();
        let metrics = region.metrics();

        let sequence = frame.sequence & SEQUENCE_MASK;
        if let Some(previous) = self.last_sequence {
            let expected = previous.wrapping_add(1) & SEQUENCE_MASK;
            if sequence != expected {
                let gap = sequence.wrapping_sub(expected) & SEQUENCE_MASK;
                metrics
                    .sequence_gaps
                    .fetch_add(gap.min(MAX_GAP_EVENT), Ordering::Relaxed);
            }
        }
        self.last_sequence = Some(sequence);

        let capacity = region.ring(RingId::Inbound).capacity;
        control.in_tail.store(
            ((frame.tail_pos + frame.frame_len) % capacity) as i32,
            Ordering::Release,
        );
    }
}
