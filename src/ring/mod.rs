//! Lock-free SPSC ring transport
//!
//! Three rings share one frame format: a 16-byte header followed by a
//! contiguous payload. Frames never wrap; a writer that cannot fit a frame
//! before the ring's end stamps a padding sentinel (or zeroes the slack)
//! and resumes at offset 0. Framing is recovered by the consumer entirely
//! from `magic` and `length`.

pub mod frame;
pub mod reader;
pub mod writer;

pub use frame::FrameHeader;
pub use reader::{InboundReader, Pull, PulledFrame};
pub use writer::RingWriter;
