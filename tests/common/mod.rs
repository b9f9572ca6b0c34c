//! Shared test fixtures: a recording stub engine and ring helpers
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

use ostinato::{
    layout::HEADER_SIZE, Engine, EngineContext, EngineError, EngineOptions, FrameHeader, NodeDesc,
    ReplyAddr, RingId, SharedRegion, FRAMES_PER_QUANTUM,
};

/// One recorded dispatch with the offsets in force when it ran
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub payload: Vec<u8>,
    pub was_bundle: bool,
    pub sample_offset: u32,
    pub subsample_offset: f32,
    pub quantum: u32,
}

/// Everything the stub engine observed
#[derive(Debug, Default)]
pub struct EngineLog {
    pub dispatches: Vec<Dispatch>,
    pub quanta: u32,
    pub last_active_in: u32,
    pub input_energy: f32,
}

/// Scripted engine: records dispatches, obeys a few magic addresses and
/// renders a deterministic ramp so egress and capture can be checked.
///
/// Magic addresses:
/// - `/fail`      -> returns a dispatch error
/// - `/reply`     -> replies `/done` immediately through the sink
/// - `/notify`    -> queues `/n_go`, emitted at notification flush
/// - `/node+<id>` -> reports a node-added lifecycle event
/// - `/node-<id>` -> reports a node-removed lifecycle event
pub struct StubEngine {
    options: EngineOptions,
    bus: Vec<f32>,
    sample_offset: u32,
    subsample_offset: f32,
    pending_notifications: Vec<Vec<u8>>,
    log: Rc<RefCell<EngineLog>>,
}

impl StubEngine {
    pub fn new(options: &EngineOptions) -> (Self, Rc<RefCell<EngineLog>>) {
        let log = Rc::new(RefCell::new(EngineLog::default()));
        let engine = Self {
            options: options.clone(),
            bus: vec![0.0; options.output_channels as usize * FRAMES_PER_QUANTUM],
            sample_offset: 0,
            subsample_offset: 0.0,
            pending_notifications: Vec::new(),
            log: log.clone(),
        };
        (engine, log)
    }

    /// The ramp value rendered at (quantum, channel, frame)
    pub fn expected_sample(quantum: u32, channel: usize, frame: usize) -> f32 {
        quantum as f32 * 1000.0 + channel as f32 * 200.0 + frame as f32
    }

    fn record(&mut self, payload: &[u8], was_bundle: bool) {
        let mut log = self.log.borrow_mut();
        let quantum = log.quanta;
        log.dispatches.push(Dispatch {
            payload: payload.to_vec(),
            was_bundle,
            sample_offset: self.sample_offset,
            subsample_offset: self.subsample_offset,
            quantum,
        });
    }

    fn obey(
        &mut self,
        payload: &[u8],
        cx: &mut EngineContext<'_>,
    ) -> Result<(), EngineError> {
        if payload.starts_with(b"/fail") {
            return Err(EngineError::CommandFailed(7));
        }
        if payload.starts_with(b"/reply") {
            cx.replies.reply(ReplyAddr::default(), b"/done");
        }
        if payload.starts_with(b"/notify") {
            self.pending_notifications.push(b"/n_go".to_vec());
        }
        if let Some(rest) = payload.strip_prefix(b"/node+") {
            let id = parse_id(rest);
            cx.nodes.node_added(&NodeDesc {
                id,
                parent_id: -1,
                is_group: false,
                prev_id: -1,
                next_id: -1,
                head_id: -1,
                def_name: "stub",
            });
        }
        if let Some(rest) = payload.strip_prefix(b"/node-") {
            cx.nodes.node_removed(parse_id(rest));
        }
        Ok(())
    }
}

fn parse_id(bytes: &[u8]) -> i32 {
    let text: String = bytes
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    text.parse().unwrap_or(0)
}

impl Engine for StubEngine {
    fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn begin_quantum(&mut self, input: &[f32], active_in: u32) {
        self.bus.fill(0.0);
        let mut log = self.log.borrow_mut();
        log.quanta += 1;
        log.last_active_in = active_in;
        log.input_energy = input.iter().sum();
    }

    fn set_dispatch_offset(&mut self, sample_offset: u32, subsample_offset: f32) {
        self.sample_offset = sample_offset;
        self.subsample_offset = subsample_offset;
    }

    fn dispatch_message(
        &mut self,
        payload: &[u8],
        _reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> Result<(), EngineError> {
        self.record(payload, false);
        self.obey(payload, cx)
    }

    fn dispatch_bundle(
        &mut self,
        payload: &[u8],
        _reply: ReplyAddr,
        cx: &mut EngineContext<'_>,
    ) -> Result<(), EngineError> {
        self.record(payload, true);
        // Bundles carry one message after the 16-byte bundle header.
        if payload.len() > 16 {
            let contents = payload[16..].to_vec();
            self.obey(&contents, cx)?;
        }
        Ok(())
    }

    fn run_quantum(&mut self, _cx: &mut EngineContext<'_>) {
        let quantum = self.log.borrow().quanta;
        let channels = self.options.output_channels as usize;
        for ch in 0..channels {
            for frame in 0..FRAMES_PER_QUANTUM {
                self.bus[ch * FRAMES_PER_QUANTUM + frame] =
                    Self::expected_sample(quantum, ch, frame);
            }
        }
    }

    fn flush_notifications(&mut self, cx: &mut EngineContext<'_>) {
        for payload in self.pending_notifications.drain(..) {
            cx.replies.reply(ReplyAddr::default(), &payload);
        }
    }

    fn output_bus(&self) -> &[f32] {
        &self.bus
    }
}

/// Drain every frame from a ring as the control-side consumer would,
/// returning payloads in consumption order.
pub fn drain_ring(region: &SharedRegion, id: RingId) -> Vec<Vec<u8>> {
    let ring = region.ring(id);
    let control = region.control();
    let (head, tail): (&AtomicI32, &AtomicI32) = match id {
        RingId::Inbound => (&control.in_head, &control.in_tail),
        RingId::Reply => (&control.out_head, &control.out_tail),
        RingId::Debug => (&control.dbg_head, &control.dbg_tail),
    };

    let mut payloads = Vec::new();
    loop {
        let h = head.load(Ordering::Acquire) as u32;
        let t = tail.load(Ordering::Relaxed) as u32;
        if h == t {
            break;
        }
        let header = unsafe { FrameHeader::read_straddled(ring.base, ring.capacity, t) };
        if ring.capacity - t < HEADER_SIZE && header.is_zero() {
            tail.store(0, Ordering::Release);
            continue;
        }
        if header.is_padding() {
            tail.store(0, Ordering::Release);
            continue;
        }
        assert!(header.is_message(), "corrupt frame in test drain");
        let payload_len = (header.length - HEADER_SIZE) as usize;
        let mut payload = vec![0u8; payload_len];
        unsafe {
            std::ptr::copy_nonoverlapping(
                ring.base.add((t + HEADER_SIZE) as usize),
                payload.as_mut_ptr(),
                payload_len,
            );
        }
        payloads.push(payload);
        tail.store(
            ((t + header.length) % ring.capacity) as i32,
            Ordering::Release,
        );
    }
    payloads
}

/// Debug-ring lines as strings
pub fn drain_debug_lines(region: &SharedRegion) -> Vec<String> {
    drain_ring(region, RingId::Debug)
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .collect()
}
