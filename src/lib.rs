//! # Ostinato - Host/DSP Boundary Core
//!
//! Ostinato is the shared-memory boundary between a host audio environment
//! and an externally driven synthesis engine. The host invokes one render
//! entrypoint per 128-frame quantum; the core drains command packets from
//! a lock-free inbound ring, schedules time-tagged bundles for
//! sample-accurate dispatch, runs the engine, and publishes replies, log
//! lines, metrics and a pollable node-tree mirror back through the same
//! shared region.
//!
//! ## Features
//!
//! - **Single shared region**: rings, counters, mirror and capture at
//!   compile-time offsets, exported through one layout descriptor
//! - **Lock-free SPSC rings**: inbound commands, outbound replies, debug
//!   lines — framed, sequenced, padding-aware
//! - **Bundle scheduler**: fixed slot pool + sorted queue, FIFO among
//!   equal time tags, backpressure when full
//! - **Node-tree mirror**: flat entry array with O(1) free-list
//!   allocation and O(1) hash lookup, version-counted for observers
//! - **No allocation on the render path**: everything is sized at init
//! - **C API**: host entrypoints for AudioWorklet-style embedders
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    Shared Region                      │
//! │  IN ring │ OUT ring │ DBG ring │ CTL │ MET │ NT │ CAP │
//! └───────────────────────────────────────────────────────┘
//!      │           ▲          ▲                 ▲
//!      ▼           │          │                 │
//! ┌───────────────────────────────────────────────────────┐
//! │            Core (render thread, per quantum)          │
//! │  drain -> classify -> schedule -> dispatch -> render  │
//! │        -> notify -> egress -> capture -> metrics      │
//! └───────────────────────────────────────────────────────┘
//!                          │  Engine trait
//!                          ▼
//!                 external synthesis engine
//! ```

// Core modules
pub mod capture;
pub mod core;
pub mod debug;
pub mod engine;
pub mod error;
pub mod layout;
pub mod mirror;
pub mod packet;
pub mod ring;
pub mod sched;
pub mod shm;
pub mod timebase;

#[cfg(feature = "c-api")]
pub mod ffi;

// Main API re-exports
pub use crate::core::{Core, DEFAULT_MAX_MESSAGES_PER_QUANTUM};
pub use capture::{capture_quantum, CaptureBlock, CaptureOutcome};
pub use engine::{
    Engine, EngineContext, EngineError, EngineFactory, EngineOptions, NodeDesc, NodeObserver,
    ReplyAddr, ReplySink,
};
pub use error::{CoreError, Result};
pub use layout::{BufferLayout, BUFFER_LAYOUT, FRAMES_PER_QUANTUM};
pub use mirror::{NodeEntry, NodeMirror, NodeTreeHeader};
pub use ring::{FrameHeader, InboundReader, RingWriter};
pub use sched::{BundleScheduler, SLOT_COUNT, SLOT_SIZE};
pub use shm::{
    ControlBlock, MetricsBlock, RingId, SharedRegion, STATUS_BUFFER_FULL, STATUS_ENGINE_ERROR,
    STATUS_FRAGMENTED_MSG, STATUS_OVERRUN,
};
pub use timebase::{seconds_to_tag, QuantumClock, TimeBlock};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    /// Inbound dispatches per quantum before the drain loop yields
    pub const DEFAULT_MAX_MESSAGES_PER_QUANTUM: u32 = 32;

    /// Late-bundle log suppression interval
    pub const LATE_LOG_EVERY: u32 = 32;

    /// Scheduler sizing
    pub const DEFAULT_SLOT_COUNT: usize = crate::sched::SLOT_COUNT;
    pub const DEFAULT_SLOT_SIZE: usize = crate::sched::SLOT_SIZE;
}
