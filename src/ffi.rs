//! C host entrypoints
//!
//! The glue an AudioWorklet-style host drives: one [`Core`] value behind a
//! render-thread cell, plus introspection accessors. Every function here
//! is called from the single render thread (or from the host's init
//! sequence before rendering starts); the cell documents and encapsulates
//! that contract instead of scattering raw pointer globals.

use std::cell::UnsafeCell;
use std::ffi::{c_char, CStr};
use std::sync::atomic::Ordering;

use crate::{
    core::Core,
    engine::{Engine, EngineFactory},
    error::CoreError,
    layout::{BufferLayout, FRAMES_PER_QUANTUM, BUFFER_LAYOUT},
    shm::SharedRegion,
};

/// Single-render-thread storage cell.
///
/// The audio host guarantees every entrypoint runs on one thread, so a
/// plain option behind `UnsafeCell` is sufficient; `Sync` is asserted on
/// that external contract.
struct RenderCell<T> {
    inner: UnsafeCell<Option<T>>,
}

unsafe impl<T> Sync for RenderCell<T> {}

impl<T> RenderCell<T> {
    const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(None),
        }
    }

    /// # Safety
    /// Callers must be on the render thread.
    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self) -> &mut Option<T> {
        &mut *self.inner.get()
    }
}

type HostCore = Core<Box<dyn Engine>>;

static HOST: RenderCell<HostCore> = RenderCell::new();
static FACTORY: RenderCell<EngineFactory> = RenderCell::new();

/// Register the engine factory invoked by [`init_memory`]. Must run
/// before the host calls any entrypoint that needs an engine.
pub fn install_engine_factory(factory: EngineFactory) {
    unsafe { *FACTORY.get() = Some(factory) };
}

/// Tear down the host state (test harnesses between runs)
pub fn reset_host() {
    unsafe {
        *HOST.get() = None;
        *FACTORY.get() = None;
    }
}

unsafe fn host() -> &'static mut HostCore {
    let slot = HOST.get();
    if slot.is_none() {
        let region = SharedRegion::new().expect("shared region allocation failed at startup");
        *slot = Some(Core::new(region));
    }
    slot.as_mut().expect("just populated")
}

/// Base address of the shared region. The control thread locates every
/// block from this plus the layout descriptor.
#[no_mangle]
pub extern "C" fn get_ring_buffer_base() -> usize {
    unsafe { host() }.region().base_ptr() as usize
}

/// Pointer to the compile-time layout descriptor
#[no_mangle]
pub extern "C" fn get_buffer_layout() -> *const BufferLayout {
    &BUFFER_LAYOUT
}

/// Initialize the core: reset shared blocks, read the engine option slots
/// and construct the engine through the installed factory. Idempotent.
#[no_mangle]
pub extern "C" fn init_memory(sample_rate: f64) {
    let core = unsafe { host() };
    let factory = unsafe { *FACTORY.get() }.unwrap_or(missing_factory);
    core.init(sample_rate, |options| factory(options));
}

fn missing_factory(
    _options: &crate::engine::EngineOptions,
) -> crate::error::Result<Box<dyn Engine>> {
    Err(CoreError::engine_init("no engine factory installed"))
}

/// One render callback. Returns true to keep the processor alive.
#[no_mangle]
pub extern "C" fn process_audio(current_time: f64, active_out: u32, active_in: u32) -> bool {
    unsafe { host() }.process_quantum(current_time, active_out, active_in)
}

/// Empty the bundle scheduler and reset inbound sequence tracking
#[no_mangle]
pub extern "C" fn clear_scheduler() {
    unsafe { host() }.clear_scheduler();
}

#[no_mangle]
pub extern "C" fn set_time_offset(seconds: f64) {
    unsafe { host() }.set_time_offset(seconds);
}

#[no_mangle]
pub extern "C" fn get_time_offset() -> f64 {
    unsafe { host() }.time_offset()
}

/// Stable staging buffer holding the last rendered quantum
#[no_mangle]
pub extern "C" fn get_audio_output_bus() -> *const f32 {
    unsafe { host() }.output_bus().as_ptr()
}

/// Staging buffer the host fills with input samples before each quantum
#[no_mangle]
pub extern "C" fn get_audio_input_bus() -> *mut f32 {
    unsafe { host() }.input_bus_mut().as_mut_ptr()
}

#[no_mangle]
pub extern "C" fn get_audio_buffer_samples() -> i32 {
    FRAMES_PER_QUANTUM as i32
}

#[no_mangle]
pub extern "C" fn get_process_count() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .process_count
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_messages_processed() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .messages_processed
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_messages_dropped() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .messages_dropped
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_status_flags() -> u32 {
    unsafe { host() }.region().control().status()
}

#[no_mangle]
pub extern "C" fn get_scheduler_depth() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .scheduler_queue_depth
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_scheduler_dropped() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .scheduler_queue_dropped
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_scheduler_lates() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .scheduler_lates
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_scheduler_max_late_ms() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .scheduler_max_late_ms
        .load(Ordering::Relaxed)
}

#[no_mangle]
pub extern "C" fn get_sequence_gaps() -> u32 {
    unsafe { host() }
        .region()
        .metrics()
        .sequence_gaps
        .load(Ordering::Relaxed)
}

/// Publish a pre-formatted NUL-terminated line to the DBG ring.
///
/// # Safety
/// `message` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn worklet_debug(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let bytes = CStr::from_ptr(message).to_bytes();
    host().debug_raw(bytes);
}

/// Publish a raw byte line to the DBG ring.
///
/// # Safety
/// `message` must point to `length` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn worklet_debug_raw(message: *const u8, length: u32) {
    if message.is_null() {
        return;
    }
    let bytes = std::slice::from_raw_parts(message, length as usize);
    host().debug_raw(bytes);
}
