//! Protocol time and the quantum clock
//!
//! Protocol time is a 64-bit fixed-point value: upper 32 bits integer
//! seconds from the protocol epoch, lower 32 bits fractional seconds
//! (2^32 units per second). The render thread folds the control thread's
//! time-base corrections in at the top of every quantum — nothing is
//! cached across quanta, so a resync after a host-clock pause is observed
//! immediately.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crate::layout::{FRAMES_PER_QUANTUM, TIME_SIZE};

/// Fixed-point units per second
pub const TICKS_PER_SECOND: f64 = 4_294_967_296.0;

/// Shared time-base fields.
///
/// `start_seconds` holds f64 bits and is written once by the control
/// thread (the absolute epoch seconds at which the host clock read 0).
/// The two millisecond corrections may be rewritten at any time.
#[repr(C, align(8))]
pub struct TimeBlock {
    start_seconds: AtomicU64,
    drift_ms: AtomicI32,
    global_ms: AtomicI32,
}

const _: () = assert!(std::mem::size_of::<TimeBlock>() == TIME_SIZE as usize);

impl TimeBlock {
    /// Install the host-clock epoch offset (write-once by convention)
    pub fn set_start_seconds(&self, seconds: f64) {
        self.start_seconds.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn start_seconds(&self) -> f64 {
        f64::from_bits(self.start_seconds.load(Ordering::Acquire))
    }

    pub fn set_drift_ms(&self, ms: i32) {
        self.drift_ms.store(ms, Ordering::Relaxed);
    }

    pub fn drift_ms(&self) -> i32 {
        self.drift_ms.load(Ordering::Relaxed)
    }

    pub fn set_global_ms(&self, ms: i32) {
        self.global_ms.store(ms, Ordering::Relaxed);
    }

    pub fn global_ms(&self) -> i32 {
        self.global_ms.load(Ordering::Relaxed)
    }
}

/// Convert absolute seconds to a protocol time tag
pub fn seconds_to_tag(seconds: f64) -> u64 {
    let clamped = seconds.max(0.0);
    let whole = clamped as u64;
    let frac = ((clamped - whole as f64) * TICKS_PER_SECOND) as u64;
    ((whole & 0xFFFF_FFFF) << 32) | (frac & 0xFFFF_FFFF)
}

/// Per-sample-rate conversion constants, cached at bind-up
#[derive(Debug, Clone, Copy)]
pub struct QuantumClock {
    sample_rate: f64,
    quantum_ticks: u64,
    samples_per_tick: f64,
}

impl QuantumClock {
    pub fn new(sample_rate: f64) -> Self {
        let quantum_ticks =
            (FRAMES_PER_QUANTUM as f64 / sample_rate * TICKS_PER_SECOND) as u64;
        Self {
            sample_rate,
            quantum_ticks,
            samples_per_tick: sample_rate / TICKS_PER_SECOND,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Duration of one quantum in protocol-time units
    pub fn quantum_ticks(&self) -> u64 {
        self.quantum_ticks
    }

    /// Absolute protocol time at the start of the current quantum.
    ///
    /// Reads all three time-base fields fresh on every call.
    pub fn now(&self, time: &TimeBlock, host_seconds: f64) -> u64 {
        let seconds = host_seconds
            + time.start_seconds()
            + time.drift_ms() as f64 / 1000.0
            + time.global_ms() as f64 / 1000.0;
        seconds_to_tag(seconds)
    }

    /// Sample and sub-sample offset of a scheduled tag inside the quantum
    /// starting at `now`. The sample offset is clamped to the quantum.
    pub fn dispatch_offset(&self, scheduled: u64, now: u64) -> (u32, f32) {
        let diff_ticks = scheduled.wrapping_sub(now) as i64;
        let diff = diff_ticks as f64 * self.samples_per_tick + 0.5;
        let floor = diff.floor();
        let sample_offset = (floor as i64).clamp(0, FRAMES_PER_QUANTUM as i64 - 1) as u32;
        (sample_offset, (diff - floor) as f32)
    }

    /// How late a scheduled tag is relative to `now`, in milliseconds.
    /// Negative values mean the tag is still in the future.
    pub fn late_ms(&self, now: u64, scheduled: u64) -> f64 {
        let diff_ticks = now.wrapping_sub(scheduled) as i64;
        diff_ticks as f64 / TICKS_PER_SECOND * 1000.0
    }
}
