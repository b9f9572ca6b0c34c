//! Shared memory blocks and the region that hosts them
//!
//! The control thread and the render thread communicate exclusively through
//! the blocks in this module, all of which live at fixed offsets inside one
//! contiguous [`SharedRegion`].

pub mod control;
pub mod metrics;
pub mod region;

pub use control::{
    ControlBlock, STATUS_BUFFER_FULL, STATUS_ENGINE_ERROR, STATUS_FRAGMENTED_MSG, STATUS_OVERRUN,
};
pub use metrics::MetricsBlock;
pub use region::{RingId, SharedRegion};
