//! Ring frame header

use crate::layout::{HEADER_SIZE, MESSAGE_MAGIC, PADDING_MAGIC};

/// 16-byte header preceding every ring payload.
///
/// `length` includes the header itself. The padding sentinel is a
/// header-only record with `magic == PADDING_MAGIC` and `length == 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub length: u32,
    pub sequence: u32,
    pub reserved: u32,
}

const _: () = assert!(std::mem::size_of::<FrameHeader>() == HEADER_SIZE as usize);

impl FrameHeader {
    /// Header for a message frame carrying `payload_len` payload bytes
    pub fn message(payload_len: u32, sequence: u32) -> Self {
        Self {
            magic: MESSAGE_MAGIC,
            length: HEADER_SIZE + payload_len,
            sequence,
            reserved: 0,
        }
    }

    /// The tail-of-ring padding sentinel
    pub fn padding() -> Self {
        Self {
            magic: PADDING_MAGIC,
            length: 0,
            sequence: 0,
            reserved: 0,
        }
    }

    pub fn is_message(&self) -> bool {
        self.magic == MESSAGE_MAGIC
    }

    pub fn is_padding(&self) -> bool {
        self.magic == PADDING_MAGIC
    }

    /// True when every header byte is zero (writer slack at the ring end)
    pub fn is_zero(&self) -> bool {
        self.magic == 0 && self.length == 0 && self.sequence == 0 && self.reserved == 0
    }

    /// Serialize into 16 little-endian bytes
    pub fn to_bytes(self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.length.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.reserved.to_le_bytes());
        bytes
    }

    /// Deserialize from 16 little-endian bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE as usize]) -> Self {
        Self {
            magic: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            length: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            sequence: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            reserved: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
        }
    }

    /// Read a header at ring offset `at`, handling a read that straddles
    /// the wrap with two copies.
    ///
    /// # Safety
    /// `base` must point to `capacity` readable bytes and `at < capacity`.
    pub unsafe fn read_straddled(base: *const u8, capacity: u32, at: u32) -> Self {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        let first = (capacity - at).min(HEADER_SIZE) as usize;
        std::ptr::copy_nonoverlapping(base.add(at as usize), bytes.as_mut_ptr(), first);
        if first < HEADER_SIZE as usize {
            std::ptr::copy_nonoverlapping(
                base,
                bytes.as_mut_ptr().add(first),
                HEADER_SIZE as usize - first,
            );
        }
        Self::from_bytes(&bytes)
    }
}
