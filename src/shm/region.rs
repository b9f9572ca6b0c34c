//! The shared memory region
//!
//! One contiguous, 8-aligned byte region holding every block described in
//! [`crate::layout`]. Constructed zeroed exactly once at initialization and
//! never freed while the core is alive. The default backing is a private
//! heap allocation; the `memfd` feature adds an anonymous-file backing so
//! out-of-process observers can map the same bytes.

use std::ptr::NonNull;

use crate::{
    capture::CaptureBlock,
    error::{CoreError, Result},
    layout::{
        CAPTURE_HEADER_SIZE, CAPTURE_START, CONTROL_START, DBG_RING_SIZE, DBG_RING_START,
        IN_RING_SIZE, IN_RING_START, METRICS_START, NODE_TREE_HEADER_SIZE, NODE_TREE_START,
        OPTIONS_START, OPTION_SLOTS, OUT_RING_SIZE, OUT_RING_START, REGION_ALIGN, TIME_START,
        TOTAL_REGION_SIZE,
    },
    mirror::{NodeEntry, NodeTreeHeader},
    shm::{ControlBlock, MetricsBlock},
    timebase::TimeBlock,
};

/// Identifies one of the three SPSC rings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingId {
    /// Inbound commands (control thread -> render thread)
    Inbound,
    /// Outbound replies (render thread -> control thread)
    Reply,
    /// Debug/log lines (render thread -> control thread)
    Debug,
}

/// Base pointer and capacity of one ring's storage
#[derive(Debug, Clone, Copy)]
pub struct RingRegion {
    pub base: *mut u8,
    pub capacity: u32,
}

enum Backing {
    Heap(NonNull<u8>),
    #[cfg(feature = "memfd")]
    Memfd {
        map: memmap2::MmapMut,
        _fd: std::os::fd::OwnedFd,
    },
}

/// The shared region itself.
///
/// All accessors hand out references to atomic-only blocks, or raw
/// pointers for bulk byte storage (ring payload space, capture frames).
/// The backing allocation never moves, so pointers derived from it stay
/// valid for the lifetime of the region.
pub struct SharedRegion {
    ptr: NonNull<u8>,
    backing: Backing,
}

// One render thread mutates; peers touch only atomics or tolerate tears
// under the version-retry contract of the node mirror.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocate a zeroed, heap-backed region
    pub fn new() -> Result<Self> {
        let layout =
            std::alloc::Layout::from_size_align(TOTAL_REGION_SIZE as usize, REGION_ALIGN)
                .map_err(|_| CoreError::memory("Failed to create layout for shared region"))?;

        let ptr = unsafe {
            let raw = std::alloc::alloc_zeroed(layout);
            NonNull::new(raw).ok_or_else(|| CoreError::memory("Failed to allocate shared region"))?
        };

        log::debug!("shared region allocated: {} bytes", TOTAL_REGION_SIZE);

        Ok(Self {
            ptr,
            backing: Backing::Heap(ptr),
        })
    }

    /// Create a memfd-backed region that observer processes can map by fd
    #[cfg(feature = "memfd")]
    pub fn new_memfd(name: &str) -> Result<Self> {
        use std::os::fd::AsRawFd;

        let cname = std::ffi::CString::new(name)
            .map_err(|_| CoreError::invalid_parameter("name", "Region name contains NUL"))?;
        let fd = nix::sys::memfd::memfd_create(&cname, nix::sys::memfd::MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| CoreError::platform(format!("memfd_create failed: {}", e)))?;
        nix::unistd::ftruncate(&fd, TOTAL_REGION_SIZE as i64)
            .map_err(|e| CoreError::platform(format!("ftruncate failed: {}", e)))?;

        let mut map = unsafe {
            memmap2::MmapOptions::new()
                .len(TOTAL_REGION_SIZE as usize)
                .map_mut(fd.as_raw_fd())
                .map_err(|e| CoreError::platform(format!("mmap failed: {}", e)))?
        };

        let ptr = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| CoreError::memory("mmap returned null"))?;
        if (ptr.as_ptr() as usize) % REGION_ALIGN != 0 {
            return Err(CoreError::alignment(ptr.as_ptr() as usize, REGION_ALIGN));
        }

        log::debug!("shared region mapped via memfd '{}'", name);

        Ok(Self {
            ptr,
            backing: Backing::Memfd { map, _fd: fd },
        })
    }

    /// Base address of the region
    pub fn base_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Total region size in bytes
    pub fn size(&self) -> usize {
        TOTAL_REGION_SIZE as usize
    }

    #[inline]
    fn at(&self, offset: u32) -> *mut u8 {
        unsafe { self.ptr.as_ptr().add(offset as usize) }
    }

    /// The control block (ring indices, sequence counters, status flags)
    #[inline]
    pub fn control(&self) -> &ControlBlock {
        unsafe { &*(self.at(CONTROL_START) as *const ControlBlock) }
    }

    /// The metrics block
    #[inline]
    pub fn metrics(&self) -> &MetricsBlock {
        unsafe { &*(self.at(METRICS_START) as *const MetricsBlock) }
    }

    /// The time-base block
    #[inline]
    pub fn time(&self) -> &TimeBlock {
        unsafe { &*(self.at(TIME_START) as *const TimeBlock) }
    }

    /// The node-mirror header
    #[inline]
    pub fn node_header(&self) -> &NodeTreeHeader {
        unsafe { &*(self.at(NODE_TREE_START) as *const NodeTreeHeader) }
    }

    /// Base of the node-mirror entry array
    #[inline]
    pub fn node_entries(&self) -> *mut NodeEntry {
        self.at(NODE_TREE_START + NODE_TREE_HEADER_SIZE) as *mut NodeEntry
    }

    /// The audio-capture header
    #[inline]
    pub fn capture(&self) -> &CaptureBlock {
        unsafe { &*(self.at(CAPTURE_START) as *const CaptureBlock) }
    }

    /// Base of the interleaved capture frame storage
    #[inline]
    pub fn capture_frames(&self) -> *mut f32 {
        self.at(CAPTURE_START + CAPTURE_HEADER_SIZE) as *mut f32
    }

    /// Storage for the given ring
    pub fn ring(&self, id: RingId) -> RingRegion {
        let (start, capacity) = match id {
            RingId::Inbound => (IN_RING_START, IN_RING_SIZE),
            RingId::Reply => (OUT_RING_START, OUT_RING_SIZE),
            RingId::Debug => (DBG_RING_START, DBG_RING_SIZE),
        };
        RingRegion {
            base: self.at(start),
            capacity,
        }
    }

    /// Read the 16 engine-option slots the control thread filled in
    pub fn option_slots(&self) -> [u32; OPTION_SLOTS] {
        let mut slots = [0u32; OPTION_SLOTS];
        let base = self.at(OPTIONS_START) as *const u32;
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = unsafe { base.add(i).read() };
        }
        slots
    }

    /// Write the option slots (control-side helper, also used by tests)
    pub fn write_option_slots(&self, slots: &[u32; OPTION_SLOTS]) {
        let base = self.at(OPTIONS_START) as *mut u32;
        for (i, slot) in slots.iter().enumerate() {
            unsafe { base.add(i).write(*slot) };
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Backing::Heap(ptr) = &self.backing {
            let layout =
                std::alloc::Layout::from_size_align(TOTAL_REGION_SIZE as usize, REGION_ALIGN)
                    .expect("region layout was valid at construction");
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}
