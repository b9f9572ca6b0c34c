//! Command-packet classification
//!
//! The core parses only enough of the command protocol to recognize bundle
//! headers, time tags and framing; argument grammars belong to the engine.

/// Eight-byte marker opening every bundle payload
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Minimum size of a well-formed bundle (tag + time tag)
pub const MIN_BUNDLE_SIZE: usize = 16;

/// Time tags 0 and 1 both mean "execute now"
pub const TIME_TAG_IMMEDIATE: u64 = 1;

/// Shape of an inbound payload as far as dispatch is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    /// Plain message: dispatch inline
    Message,
    /// Bundle with time tag 0 or 1: dispatch inline
    ImmediateBundle,
    /// Bundle with a future time tag: hand to the scheduler
    FutureBundle(u64),
}

/// True iff the payload opens with the bundle marker
pub fn is_bundle(payload: &[u8]) -> bool {
    payload.len() >= MIN_BUNDLE_SIZE && payload[..8] == *BUNDLE_TAG
}

/// Extract the big-endian 64-bit time tag at offset 8.
///
/// Callers must have established `is_bundle` first.
pub fn bundle_time_tag(payload: &[u8]) -> u64 {
    u64::from_be_bytes(payload[8..16].try_into().unwrap())
}

/// Classify a payload for the dispatch loop
pub fn classify(payload: &[u8]) -> Classified {
    if !is_bundle(payload) {
        return Classified::Message;
    }
    let tag = bundle_time_tag(payload);
    if tag <= TIME_TAG_IMMEDIATE {
        Classified::ImmediateBundle
    } else {
        Classified::FutureBundle(tag)
    }
}

/// Build a bundle payload around `contents` (tests and host tooling)
pub fn make_bundle(time_tag: u64, contents: &[u8]) -> Vec<u8> {
    let mut bundle = Vec::with_capacity(MIN_BUNDLE_SIZE + contents.len());
    bundle.extend_from_slice(BUNDLE_TAG);
    bundle.extend_from_slice(&time_tag.to_be_bytes());
    bundle.extend_from_slice(contents);
    bundle
}
