//! Audio capture region
//!
//! A bounded region of interleaved f32 frames that test harnesses arm to
//! record produced audio without tapping the host audio path. The render
//! thread appends one quantum at a time and flips the region to disabled
//! when it runs out of room.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    layout::{CAPTURE_CHANNELS, CAPTURE_HEADER_SIZE, CAPTURE_MAX_FRAMES, FRAMES_PER_QUANTUM},
    shm::SharedRegion,
};

/// Capture header at the front of the CAP region
#[repr(C, align(8))]
pub struct CaptureBlock {
    enabled: AtomicU32,
    write_head: AtomicU32,
    sample_rate: AtomicU32,
    channels: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<CaptureBlock>() == CAPTURE_HEADER_SIZE as usize);

impl CaptureBlock {
    /// Arm capture from frame zero
    pub fn arm(&self, sample_rate: u32, channels: u32) {
        self.write_head.store(0, Ordering::Relaxed);
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.channels
            .store(channels.min(CAPTURE_CHANNELS), Ordering::Relaxed);
        self.enabled.store(1, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(0, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) != 0
    }

    /// Frames recorded so far
    pub fn frames_recorded(&self) -> u32 {
        self.write_head.load(Ordering::Acquire)
    }

    pub fn channels(&self) -> u32 {
        self.channels.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }
}

/// Result of offering one quantum to the capture region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Capture is not armed; nothing happened
    Disabled,
    /// One quantum appended
    Appended,
    /// The region filled up; capture flipped itself off
    Exhausted,
}

/// Interleave one quantum of planar audio into the capture region.
///
/// `planar` holds `source_channels` × [`FRAMES_PER_QUANTUM`] samples,
/// channel-major. Channels beyond the armed channel count are ignored;
/// missing channels record as silence.
pub fn capture_quantum(
    region: &SharedRegion,
    planar: &[f32],
    source_channels: u32,
) -> CaptureOutcome {
    let block = region.capture();
    if !block.is_enabled() {
        return CaptureOutcome::Disabled;
    }

    let head = block.write_head.load(Ordering::Relaxed);
    if head + FRAMES_PER_QUANTUM as u32 > CAPTURE_MAX_FRAMES {
        block.disable();
        return CaptureOutcome::Exhausted;
    }

    let channels = block.channels();
    let base = region.capture_frames();
    for frame in 0..FRAMES_PER_QUANTUM {
        for ch in 0..channels {
            let sample = if ch < source_channels {
                planar[ch as usize * FRAMES_PER_QUANTUM + frame]
            } else {
                0.0
            };
            let index = (head as usize + frame) * channels as usize + ch as usize;
            unsafe { base.add(index).write(sample) };
        }
    }

    block
        .write_head
        .store(head + FRAMES_PER_QUANTUM as u32, Ordering::Release);
    CaptureOutcome::Appended
}

/// Read back recorded interleaved frames (test-harness side)
pub fn recorded_samples(region: &SharedRegion) -> Vec<f32> {
    let block = region.capture();
    let samples = block.frames_recorded() as usize * block.channels() as usize;
    let base = region.capture_frames();
    (0..samples).map(|i| unsafe { base.add(i).read() }).collect()
}
