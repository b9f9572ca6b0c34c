//! Node-tree mirror
//!
//! A flat, fixed-size reflection of the engine's node hierarchy kept in
//! shared memory so external observers can poll synth/group state without
//! round-tripping through the command protocol. Updated on every node
//! lifecycle event; observers validate snapshots against the version
//! counter and retry on change.

pub mod index;
pub mod tree;

pub use index::NodeIndex;
pub use tree::{NodeEntry, NodeMirror, NodeTreeHeader, DEF_NAME_SIZE};
