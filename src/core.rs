//! The quantum dispatcher
//!
//! One [`Core`] value owns the shared region, the engine collaborator and
//! every piece of render-thread state. The host calls
//! [`Core::process_quantum`] once per audio quantum; everything the core
//! does happens inside that call, in bounded time, without locks and
//! without allocating.

use std::fmt;
use std::sync::atomic::Ordering;

use crate::{
    capture::{self, CaptureOutcome},
    debug,
    engine::{Engine, EngineContext, EngineOptions, NodeDesc, NodeObserver, ReplyAddr, ReplySink},
    error::Result,
    layout::{FRAMES_PER_QUANTUM, MAX_PAYLOAD},
    mirror::NodeMirror,
    packet::{self, Classified},
    ring::{InboundReader, Pull, RingWriter},
    sched::{BundleScheduler, SLOT_COUNT, SLOT_SIZE},
    shm::{MetricsBlock, RingId, SharedRegion, STATUS_ENGINE_ERROR, STATUS_OVERRUN},
    timebase::QuantumClock,
};

/// Default cap on inbound dispatches per quantum. Bounds the drain loop so
/// a burst of commands cannot eat the render deadline; surplus frames wait
/// for the next quantum.
pub const DEFAULT_MAX_MESSAGES_PER_QUANTUM: u32 = 32;

/// Late-bundle log cadence: first occurrence, then every Nth
const LATE_LOG_INTERVAL: u32 = 32;

/// Reply sink over the OUT ring
struct RegionReplySink<'a> {
    writer: RingWriter<'a>,
}

impl ReplySink for RegionReplySink<'_> {
    fn reply(&mut self, _addr: ReplyAddr, payload: &[u8]) -> bool {
        self.writer.write(payload)
    }
}

/// Node observer over the mirror
struct MirrorObserver<'a> {
    mirror: &'a mut NodeMirror,
}

impl NodeObserver for MirrorObserver<'_> {
    fn node_added(&mut self, node: &NodeDesc<'_>) {
        self.mirror.add(node);
    }

    fn node_removed(&mut self, id: i32) {
        self.mirror.remove(id);
    }

    fn node_moved(&mut self, node: &NodeDesc<'_>) {
        self.mirror.update(node);
    }
}

/// The render-thread core.
///
/// `SCHED_SLOTS` tunes the bundle scheduler capacity; the default matches
/// production sizing and tests instantiate small schedulers to exercise
/// backpressure.
pub struct Core<E: Engine, const SCHED_SLOTS: usize = SLOT_COUNT> {
    region: SharedRegion,
    engine: Option<E>,
    clock: Option<QuantumClock>,
    scheduler: BundleScheduler<SCHED_SLOTS>,
    mirror: NodeMirror,
    reader: InboundReader,
    scratch: Box<[u8]>,
    output: Box<[f32]>,
    input: Box<[f32]>,
    max_messages_per_quantum: u32,
    capture_exhausted_logged: bool,
}

impl<E: Engine, const SCHED_SLOTS: usize> Core<E, SCHED_SLOTS> {
    /// Wrap a freshly constructed region. The core is inert (tick-only)
    /// until [`Core::init`] succeeds.
    pub fn new(region: SharedRegion) -> Self {
        let mirror = NodeMirror::new(&region);
        Self {
            region,
            engine: None,
            clock: None,
            scheduler: BundleScheduler::new(),
            mirror,
            reader: InboundReader::new(),
            scratch: vec![0u8; MAX_PAYLOAD as usize].into_boxed_slice(),
            output: vec![0.0; 2 * FRAMES_PER_QUANTUM].into_boxed_slice(),
            input: vec![0.0; 2 * FRAMES_PER_QUANTUM].into_boxed_slice(),
            max_messages_per_quantum: DEFAULT_MAX_MESSAGES_PER_QUANTUM,
            capture_exhausted_logged: false,
        }
    }

    /// Initialize: reset the shared blocks, bind the sample rate, read the
    /// option slots and construct the engine. Idempotent — a second call
    /// with an engine already alive does nothing. An engine failure raises
    /// ENGINE_ERROR and leaves rendering a no-op.
    pub fn init<F>(&mut self, sample_rate: f64, make: F)
    where
        F: FnOnce(&EngineOptions) -> Result<E>,
    {
        if self.engine.is_some() {
            return;
        }

        self.region.control().reset();
        self.region.metrics().reset();
        self.clock = Some(QuantumClock::new(sample_rate));

        let options = EngineOptions::from_slots(&self.region.option_slots());
        if let Err(err) = options.validate() {
            self.region.control().raise(STATUS_ENGINE_ERROR);
            log::warn!("engine options rejected: {}", err);
            self.debug(format_args!("engine options rejected: {}", err));
            return;
        }

        match make(&options) {
            Ok(engine) => {
                let out_channels = options.output_channels.max(2) as usize;
                let in_channels = options.input_channels.max(2) as usize;
                self.output = vec![0.0; out_channels * FRAMES_PER_QUANTUM].into_boxed_slice();
                self.input = vec![0.0; in_channels * FRAMES_PER_QUANTUM].into_boxed_slice();
                self.engine = Some(engine);
                self.scheduler.clear();
                self.reader.reset_sequence();
                self.debug(format_args!(
                    "engine ready: {:.0}Hz, {} out / {} in channels",
                    sample_rate, options.output_channels, options.input_channels
                ));
            }
            Err(err) => {
                self.region.control().raise(STATUS_ENGINE_ERROR);
                log::warn!("engine construction failed: {}", err);
                self.debug(format_args!("engine construction failed: {}", err));
            }
        }
    }

    /// True once an engine is alive
    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// The shared region (host introspection, tests)
    pub fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// Output staging buffer the host reads after a quantum
    pub fn output_bus(&self) -> &[f32] {
        &self.output
    }

    /// Input staging buffer the host fills before a quantum
    pub fn input_bus_mut(&mut self) -> &mut [f32] {
        &mut self.input
    }

    /// Scheduler occupancy (host metric getter)
    pub fn scheduler_len(&self) -> usize {
        self.scheduler.len()
    }

    /// Adjust the drain cap (measured tuning knob; default 32)
    pub fn set_max_messages_per_quantum(&mut self, cap: u32) {
        self.max_messages_per_quantum = cap.max(1);
    }

    /// Write the host-clock epoch offset into the time block
    pub fn set_time_offset(&self, seconds: f64) {
        self.region.time().set_start_seconds(seconds);
        self.debug(format_args!("time offset set: {:.6}", seconds));
    }

    pub fn time_offset(&self) -> f64 {
        self.region.time().start_seconds()
    }

    /// Empty the scheduler pool and forget the inbound sequence state so
    /// an external ring purge does not register as a gap. Render-thread
    /// only (or quiescent).
    pub fn clear_scheduler(&mut self) {
        self.scheduler.clear();
        self.reader.reset_sequence();
        self.region
            .metrics()
            .scheduler_queue_depth
            .store(0, Ordering::Relaxed);
    }

    /// Publish a formatted line to the DBG ring
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        debug::publish_line(&RingWriter::new(&self.region, RingId::Debug), args);
    }

    /// Publish a pre-formatted line to the DBG ring
    pub fn debug_raw(&self, bytes: &[u8]) {
        debug::publish_raw(&RingWriter::new(&self.region, RingId::Debug), bytes);
    }

    /// Render one quantum. Called by the host once per callback with the
    /// host clock's current seconds and the active channel counts.
    /// Returns true to keep the processor alive.
    pub fn process_quantum(&mut self, host_seconds: f64, active_out: u32, active_in: u32) -> bool {
        let metrics = self.region.metrics();
        let tick = metrics
            .process_count
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1);

        let (Some(engine), Some(clock)) = (self.engine.as_mut(), self.clock.as_ref()) else {
            return true;
        };

        let region = &self.region;

        // 1. Time fold-in: all corrections re-read, nothing cached.
        let t_now = clock.now(region.time(), host_seconds);
        let t_end = t_now.wrapping_add(clock.quantum_ticks());

        let mut replies = RegionReplySink {
            writer: RingWriter::new(region, RingId::Reply),
        };
        let mut nodes = MirrorObserver {
            mirror: &mut self.mirror,
        };

        // 2. Drain the inbound ring, bounded per quantum.
        let mut dispatched = 0u32;
        while dispatched < self.max_messages_per_quantum {
            let frame = match self.reader.pull(region, &mut self.scratch) {
                Pull::Empty => break,
                Pull::Frame(frame) => frame,
            };
            let payload = &self.scratch[..frame.payload_len];
            let mut cx = EngineContext {
                replies: &mut replies,
                nodes: &mut nodes,
            };

            match packet::classify(payload) {
                Classified::Message => {
                    if let Err(err) = engine.dispatch_message(payload, ReplyAddr::default(), &mut cx)
                    {
                        debug::publish_line(
                            &RingWriter::new(region, RingId::Debug),
                            format_args!("dispatch error: {}", err),
                        );
                    }
                    self.reader.commit(region, &frame);
                    metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
                    dispatched += 1;
                }
                Classified::ImmediateBundle => {
                    if let Err(err) = engine.dispatch_bundle(payload, ReplyAddr::default(), &mut cx)
                    {
                        debug::publish_line(
                            &RingWriter::new(region, RingId::Debug),
                            format_args!("dispatch error: {}", err),
                        );
                    }
                    self.reader.commit(region, &frame);
                    metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
                    dispatched += 1;
                }
                Classified::FutureBundle(time_tag) => {
                    if frame.payload_len > SLOT_SIZE {
                        // Can never fit a slot; holding it would wedge
                        // the ring behind it.
                        debug::publish_line(
                            &RingWriter::new(region, RingId::Debug),
                            format_args!(
                                "bundle too large to schedule: {} bytes",
                                frame.payload_len
                            ),
                        );
                        self.reader.commit(region, &frame);
                        metrics
                            .scheduler_queue_dropped
                            .fetch_add(1, Ordering::Relaxed);
                        dispatched += 1;
                    } else if self.scheduler.is_full() {
                        // Backpressure: the frame stays in the ring and
                        // the sequence tracker was never advanced.
                        break;
                    } else {
                        self.scheduler.add(time_tag, payload, ReplyAddr::default());
                        self.reader.commit(region, &frame);
                        metrics.messages_processed.fetch_add(1, Ordering::Relaxed);
                        metrics.publish_scheduler_depth(self.scheduler.len() as u32);
                        dispatched += 1;
                    }
                }
            }
        }

        let control = region.control();
        if dispatched >= self.max_messages_per_quantum
            && control.in_head.load(Ordering::Acquire) != control.in_tail.load(Ordering::Relaxed)
        {
            control.raise(STATUS_OVERRUN);
        }

        // 3. Quantum prep: buses zeroed, counter bumped, input marked.
        let in_samples = (active_in as usize * FRAMES_PER_QUANTUM).min(self.input.len());
        engine.begin_quantum(&self.input[..in_samples], active_in);

        // 4. Scheduled dispatch: everything due inside [t_now, t_end).
        loop {
            let time_tag = self.scheduler.next_time();
            if time_tag >= t_end {
                break;
            }
            let (sample_offset, subsample_offset) = clock.dispatch_offset(time_tag, t_now);
            engine.set_dispatch_offset(sample_offset, subsample_offset);

            let Some(slot) = self.scheduler.pop() else {
                break;
            };
            {
                let bundle = self.scheduler.slot(slot);
                let mut cx = EngineContext {
                    replies: &mut replies,
                    nodes: &mut nodes,
                };
                if let Err(err) = engine.dispatch_bundle(bundle.payload(), bundle.reply(), &mut cx)
                {
                    debug::publish_line(
                        &RingWriter::new(region, RingId::Debug),
                        format_args!("dispatch error: {}", err),
                    );
                }
            }
            self.scheduler.release(slot);
            metrics.publish_scheduler_depth(self.scheduler.len() as u32);

            let late_ms = clock.late_ms(t_now, time_tag);
            if late_ms > 0.0 {
                let lates = metrics.scheduler_lates.fetch_add(1, Ordering::Relaxed) + 1;
                let magnitude = late_ms.ceil() as u32;
                metrics
                    .scheduler_max_late_ms
                    .fetch_max(magnitude, Ordering::Relaxed);
                metrics
                    .scheduler_last_late_ms
                    .store(magnitude, Ordering::Relaxed);
                metrics
                    .scheduler_last_late_tick
                    .store(tick, Ordering::Relaxed);
                if lates == 1 || lates % LATE_LOG_INTERVAL == 0 {
                    debug::publish_line(
                        &RingWriter::new(region, RingId::Debug),
                        format_args!(
                            "late bundle: {:.2}ms (offset {}, {} total)",
                            late_ms, sample_offset, lates
                        ),
                    );
                }
            }
        }
        engine.set_dispatch_offset(0, 0.0);

        // 5. Synthesis.
        {
            let mut cx = EngineContext {
                replies: &mut replies,
                nodes: &mut nodes,
            };
            engine.run_quantum(&mut cx);

            // 6. Notification fan-out into the OUT ring.
            engine.flush_notifications(&mut cx);
        }

        // 7. Audio egress to the stable staging buffer.
        let out_channels = active_out.min(engine.options().output_channels) as usize;
        let samples = (out_channels * FRAMES_PER_QUANTUM).min(self.output.len());
        let bus = engine.output_bus();
        copy_bus(&bus[..samples.min(bus.len())], &mut self.output[..samples.min(bus.len())]);

        if region.capture().is_enabled() {
            match capture::capture_quantum(region, &self.output[..samples], out_channels as u32) {
                CaptureOutcome::Exhausted => {
                    if !self.capture_exhausted_logged {
                        debug::publish_line(
                            &RingWriter::new(region, RingId::Debug),
                            format_args!("capture region full, capture disabled"),
                        );
                        self.capture_exhausted_logged = true;
                    }
                }
                CaptureOutcome::Appended | CaptureOutcome::Disabled => {}
            }
        }

        // 8. Metrics: instantaneous ring usage and peaks.
        publish_ring_metrics(region, metrics);

        true
    }
}

fn publish_ring_metrics(region: &SharedRegion, metrics: &MetricsBlock) {
    let control = region.control();
    let pairs = [
        (
            RingId::Inbound,
            &control.in_head,
            &control.in_tail,
            &metrics.in_ring_used,
            &metrics.in_ring_peak,
        ),
        (
            RingId::Reply,
            &control.out_head,
            &control.out_tail,
            &metrics.out_ring_used,
            &metrics.out_ring_peak,
        ),
        (
            RingId::Debug,
            &control.dbg_head,
            &control.dbg_tail,
            &metrics.dbg_ring_used,
            &metrics.dbg_ring_peak,
        ),
    ];
    for (id, head, tail, used, peak) in pairs {
        let capacity = region.ring(id).capacity;
        let head = head.load(Ordering::Relaxed) as u32;
        let tail = tail.load(Ordering::Relaxed) as u32;
        let bytes = head.wrapping_sub(tail) % capacity;
        MetricsBlock::publish_ring_usage(used, peak, bytes);
    }
}

#[cfg(all(feature = "simd", target_arch = "wasm32", target_feature = "simd128"))]
fn copy_bus(src: &[f32], dst: &mut [f32]) {
    use std::arch::wasm32::{v128, v128_load, v128_store};
    debug_assert_eq!(src.len(), dst.len());
    let chunks = src.len() / 4;
    unsafe {
        for i in 0..chunks {
            let vec = v128_load(src.as_ptr().add(i * 4) as *const v128);
            v128_store(dst.as_mut_ptr().add(i * 4) as *mut v128, vec);
        }
    }
    let copied = chunks * 4;
    dst[copied..].copy_from_slice(&src[copied..]);
}

#[cfg(not(all(feature = "simd", target_arch = "wasm32", target_feature = "simd128")))]
fn copy_bus(src: &[f32], dst: &mut [f32]) {
    dst.copy_from_slice(src);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::error::CoreError;

    /// Minimal engine that renders silence
    struct Silence {
        options: EngineOptions,
        bus: Vec<f32>,
    }

    impl Silence {
        fn new(options: &EngineOptions) -> Self {
            Self {
                options: options.clone(),
                bus: vec![0.0; options.output_channels as usize * FRAMES_PER_QUANTUM],
            }
        }
    }

    impl Engine for Silence {
        fn options(&self) -> &EngineOptions {
            &self.options
        }
        fn begin_quantum(&mut self, _input: &[f32], _active_in: u32) {
            self.bus.fill(0.0);
        }
        fn set_dispatch_offset(&mut self, _sample_offset: u32, _subsample_offset: f32) {}
        fn dispatch_message(
            &mut self,
            _payload: &[u8],
            _reply: ReplyAddr,
            _cx: &mut EngineContext<'_>,
        ) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        fn dispatch_bundle(
            &mut self,
            _payload: &[u8],
            _reply: ReplyAddr,
            _cx: &mut EngineContext<'_>,
        ) -> std::result::Result<(), EngineError> {
            Ok(())
        }
        fn run_quantum(&mut self, _cx: &mut EngineContext<'_>) {}
        fn flush_notifications(&mut self, _cx: &mut EngineContext<'_>) {}
        fn output_bus(&self) -> &[f32] {
            &self.bus
        }
    }

    #[test]
    fn test_uninitialized_core_only_ticks() {
        let mut core: Core<Silence> = Core::new(SharedRegion::new().unwrap());
        assert!(core.process_quantum(0.0, 2, 0));
        assert!(core.process_quantum(0.003, 2, 0));
        let metrics = core.region().metrics();
        assert_eq!(metrics.process_count.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.messages_processed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_failed_engine_raises_status() {
        let mut core: Core<Silence> = Core::new(SharedRegion::new().unwrap());
        core.init(48_000.0, |_| {
            Err(CoreError::engine_init("no wire buffers"))
        });
        assert!(!core.is_ready());
        assert_ne!(
            core.region().control().status() & STATUS_ENGINE_ERROR,
            0
        );
        // Rendering stays a keep-alive no-op.
        assert!(core.process_quantum(0.0, 2, 0));
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut core: Core<Silence> = Core::new(SharedRegion::new().unwrap());
        core.init(48_000.0, |options| Ok(Silence::new(options)));
        assert!(core.is_ready());
        // A second init must not rebuild the engine or reset state.
        core.region()
            .metrics()
            .messages_processed
            .store(5, Ordering::Relaxed);
        core.init(44_100.0, |options| Ok(Silence::new(options)));
        assert_eq!(
            core.region()
                .metrics()
                .messages_processed
                .load(Ordering::Relaxed),
            5
        );
    }

    #[test]
    fn test_time_offset_round_trip() {
        let mut core: Core<Silence> = Core::new(SharedRegion::new().unwrap());
        core.init(48_000.0, |options| Ok(Silence::new(options)));
        core.set_time_offset(3_913_056_000.5);
        assert_eq!(core.time_offset(), 3_913_056_000.5);
    }
}
