//! The synthesis-engine seam
//!
//! The core never evaluates unit generators; it drives an [`Engine`]
//! collaborator through this trait and hands it two capability objects:
//! a [`ReplySink`] for outbound replies and a [`NodeObserver`] for node
//! lifecycle events. Both are implemented by the core over the shared
//! region, so the engine stays ignorant of rings, mirrors and offsets.

use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, Result},
    layout::{FRAMES_PER_QUANTUM, OPTION_SLOTS},
};

/// Reply routing token carried with every dispatch.
///
/// The host side of the boundary has exactly one reply consumer, so this
/// is an opaque small id the engine threads back through the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyAddr(pub u32);

/// Where engine-generated reply packets go (the core's OUT ring)
pub trait ReplySink {
    /// Publish one reply packet. Returns false if the packet was dropped.
    fn reply(&mut self, addr: ReplyAddr, payload: &[u8]) -> bool;
}

/// Node lifecycle snapshot passed from the engine to the mirror
#[derive(Debug, Clone, Copy)]
pub struct NodeDesc<'a> {
    pub id: i32,
    pub parent_id: i32,
    pub is_group: bool,
    pub prev_id: i32,
    pub next_id: i32,
    /// First child id; meaningful for groups only
    pub head_id: i32,
    /// Definition name; ignored for groups
    pub def_name: &'a str,
}

/// Receiver of node lifecycle events (the core's node mirror)
pub trait NodeObserver {
    fn node_added(&mut self, node: &NodeDesc<'_>);
    fn node_removed(&mut self, id: i32);
    fn node_moved(&mut self, node: &NodeDesc<'_>);
}

/// Capabilities available to the engine during a dispatch or render call
pub struct EngineContext<'a> {
    pub replies: &'a mut dyn ReplySink,
    pub nodes: &'a mut dyn NodeObserver,
}

/// Per-dispatch failures reported by the engine.
///
/// These are diagnostic: the core logs them and continues. No allocation,
/// so they are safe to construct on the render path.
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum EngineError {
    #[error("unrecognized address pattern")]
    UnknownAddress,
    #[error("malformed packet")]
    MalformedPacket,
    #[error("command failed with code {0}")]
    CommandFailed(i32),
}

/// The external synthesis engine.
///
/// One instance is constructed at init from the option slots and owned by
/// the core for the rest of the session. All methods run on the render
/// thread and must not block or allocate.
pub trait Engine {
    fn options(&self) -> &EngineOptions;

    /// Start a quantum: zero the output buses, bump the engine's quantum
    /// counter, and for input-bearing quanta consume `input` (planar,
    /// `active_in` × frames) and mark the input buses touched.
    fn begin_quantum(&mut self, input: &[f32], active_in: u32);

    /// Position the next dispatch inside the current quantum
    fn set_dispatch_offset(&mut self, sample_offset: u32, subsample_offset: f32);

    /// Execute one non-bundle message
    fn dispatch_message(
        &mut self,
        payload: &[u8],
        reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> std::result::Result<(), EngineError>;

    /// Execute one bundle (already unwrapped to its sub-message framing)
    fn dispatch_bundle(
        &mut self,
        payload: &[u8],
        reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> std::result::Result<(), EngineError>;

    /// Render one quantum of audio into the output buses
    fn run_quantum(&mut self, cx: &mut EngineContext<'_>);

    /// Drain queued trigger/lifecycle notifications into the reply sink
    fn flush_notifications(&mut self, cx: &mut EngineContext<'_>);

    /// Planar output bus contents, `output_channels` × frames
    fn output_bus(&self) -> &[f32];
}

impl Engine for Box<dyn Engine> {
    fn options(&self) -> &EngineOptions {
        (**self).options()
    }

    fn begin_quantum(&mut self, input: &[f32], active_in: u32) {
        (**self).begin_quantum(input, active_in)
    }

    fn set_dispatch_offset(&mut self, sample_offset: u32, subsample_offset: f32) {
        (**self).set_dispatch_offset(sample_offset, subsample_offset)
    }

    fn dispatch_message(
        &mut self,
        payload: &[u8],
        reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> std::result::Result<(), EngineError> {
        (**self).dispatch_message(payload, reply, cx)
    }

    fn dispatch_bundle(
        &mut self,
        payload: &[u8],
        reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> std::result::Result<(), EngineError> {
        (**self).dispatch_bundle(payload, reply, cx)
    }

    fn run_quantum(&mut self, cx: &mut EngineContext<'_>) {
        (**self).run_quantum(cx)
    }

    fn flush_notifications(&mut self, cx: &mut EngineContext<'_>) {
        (**self).flush_notifications(cx)
    }

    fn output_bus(&self) -> &[f32] {
        (**self).output_bus()
    }
}

/// Factory installed by the embedder; invoked once from init
pub type EngineFactory = fn(&EngineOptions) -> Result<Box<dyn Engine>>;

/// Engine construction options, read from the 16 option slots the control
/// thread fills in before init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub buffer_count: u32,
    pub max_nodes: u32,
    pub max_graph_defs: u32,
    pub max_wire_buffers: u32,
    pub audio_bus_channels: u32,
    pub input_channels: u32,
    pub output_channels: u32,
    pub control_bus_channels: u32,
    /// Must equal the host quantum (128 frames)
    pub buffer_length: u32,
    pub rt_memory_size: u32,
    pub rng_count: u32,
    /// Reserved; must stay false (the core drives the engine externally)
    pub realtime: bool,
    /// Reserved; must stay false (no locking available in the sandbox)
    pub memory_locking: bool,
    pub load_graph_defs: u32,
    pub preferred_sample_rate: u32,
    pub verbosity: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            buffer_count: 1024,
            max_nodes: 1024,
            max_graph_defs: 1024,
            max_wire_buffers: 64,
            audio_bus_channels: 128,
            input_channels: 0,
            output_channels: 2,
            control_bus_channels: 4096,
            buffer_length: FRAMES_PER_QUANTUM as u32,
            rt_memory_size: 16_384,
            rng_count: 64,
            realtime: false,
            memory_locking: false,
            load_graph_defs: 0,
            preferred_sample_rate: 0,
            verbosity: 0,
        }
    }
}

impl EngineOptions {
    /// Decode from the shared option slots. All-zero slots (the control
    /// thread never wrote them) decode to the defaults.
    pub fn from_slots(slots: &[u32; OPTION_SLOTS]) -> Self {
        if slots.iter().all(|&s| s == 0) {
            return Self::default();
        }
        Self {
            buffer_count: slots[0],
            max_nodes: slots[1],
            max_graph_defs: slots[2],
            max_wire_buffers: slots[3],
            audio_bus_channels: slots[4],
            input_channels: slots[5],
            output_channels: slots[6],
            control_bus_channels: slots[7],
            buffer_length: slots[8],
            rt_memory_size: slots[9],
            rng_count: slots[10],
            realtime: slots[11] != 0,
            memory_locking: slots[12] != 0,
            load_graph_defs: slots[13],
            preferred_sample_rate: slots[14],
            verbosity: slots[15],
        }
    }

    /// Encode into the shared option slots (control-side helper)
    pub fn to_slots(&self) -> [u32; OPTION_SLOTS] {
        [
            self.buffer_count,
            self.max_nodes,
            self.max_graph_defs,
            self.max_wire_buffers,
            self.audio_bus_channels,
            self.input_channels,
            self.output_channels,
            self.control_bus_channels,
            self.buffer_length,
            self.rt_memory_size,
            self.rng_count,
            self.realtime as u32,
            self.memory_locking as u32,
            self.load_graph_defs,
            self.preferred_sample_rate,
            self.verbosity,
        ]
    }

    /// Reject option combinations the boundary cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.buffer_length != FRAMES_PER_QUANTUM as u32 {
            return Err(CoreError::invalid_parameter(
                "buffer_length",
                format!("must be {} frames", FRAMES_PER_QUANTUM),
            ));
        }
        if self.realtime {
            return Err(CoreError::invalid_parameter(
                "realtime",
                "the engine is externally driven; realtime mode must be off",
            ));
        }
        if self.memory_locking {
            return Err(CoreError::invalid_parameter(
                "memory_locking",
                "memory locking is unavailable; must be off",
            ));
        }
        if self.output_channels == 0 || self.output_channels > self.audio_bus_channels {
            return Err(CoreError::invalid_parameter(
                "output_channels",
                "must be nonzero and within the audio bus channel count",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_round_trip() {
        let options = EngineOptions {
            input_channels: 2,
            preferred_sample_rate: 48_000,
            ..Default::default()
        };
        let restored = EngineOptions::from_slots(&options.to_slots());
        assert_eq!(options, restored);
    }

    #[test]
    fn test_zeroed_slots_mean_defaults() {
        let options = EngineOptions::from_slots(&[0; OPTION_SLOTS]);
        assert_eq!(options, EngineOptions::default());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_quantum() {
        let options = EngineOptions {
            buffer_length: 256,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_reserved_flags() {
        let realtime = EngineOptions {
            realtime: true,
            ..Default::default()
        };
        assert!(realtime.validate().is_err());

        let locking = EngineOptions {
            memory_locking: true,
            ..Default::default()
        };
        assert!(locking.validate().is_err());
    }
}
