//! One registered transport endpoint.
//!
//! ```text
//!  driver ctx                         service loop
//! ┌───────────────┐  Vec<u8>  ┌───────────────────┐      ┌────────┐
//! │ InboundHandle │──────────▶│ InboundQueue      │─────▶│ codec  │──▶ rx
//! └───────────────┘           │ (embassy Channel) │      └────────┘
//!                             └───────────────────┘
//!  WireMessage ──▶ outbound VecDeque ──▶ codec.encode_tx ──▶ SendFn
//! ```
//!
//! The inbound queue is the only state shared with another execution
//! context. A driver holds an [`InboundHandle`] and pushes raw frames; the
//! service loop is the single consumer. Everything else on a [`Channel`]
//! is touched only from the service loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as FrameChannel;
use serde_json::{Value, json};

use super::codec::{CodecRegistry, ProtocolCodec};
use super::message::WireMessage;
use super::transport::{Readiness, ReadyPredicate, SendFn};
use crate::config::ChannelSettings;

/// Hard ceiling on queued inbound frames; `inbound_queue_count_max` can
/// only lower it.
pub const INBOUND_QUEUE_DEPTH: usize = 20;

// ── Inbound queue (SPSC across contexts) ──────────────────────

/// Bounded queue of raw inbound frames, limited by count and total bytes.
pub struct InboundQueue {
    frames: FrameChannel<CriticalSectionRawMutex, Vec<u8>, INBOUND_QUEUE_DEPTH>,
    bytes: AtomicUsize,
    peak: AtomicUsize,
    count_max: usize,
    bytes_max: usize,
}

impl InboundQueue {
    pub fn new(count_max: usize, bytes_max: usize) -> Self {
        Self {
            frames: FrameChannel::new(),
            bytes: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            count_max: count_max.clamp(1, INBOUND_QUEUE_DEPTH),
            bytes_max,
        }
    }

    /// Queue a copy of `data`. Returns `false` if either limit would be
    /// exceeded.
    pub fn push(&self, data: &[u8]) -> bool {
        if self.frames.len() >= self.count_max {
            return false;
        }
        let prev = self.bytes.fetch_add(data.len(), Ordering::AcqRel);
        if prev + data.len() > self.bytes_max {
            self.bytes.fetch_sub(data.len(), Ordering::AcqRel);
            return false;
        }
        if self.frames.try_send(data.to_vec()).is_err() {
            self.bytes.fetch_sub(data.len(), Ordering::AcqRel);
            return false;
        }
        self.peak.fetch_max(self.frames.len(), Ordering::Relaxed);
        true
    }

    /// Take the oldest frame.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let frame = self.frames.try_receive().ok()?;
        self.bytes.fetch_sub(frame.len(), Ordering::AcqRel);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn bytes_queued(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }

    /// Whether a frame of `len` bytes would currently fit.
    pub fn can_accept(&self, len: usize) -> bool {
        self.frames.len() < self.count_max && self.bytes_queued() + len <= self.bytes_max
    }

    pub fn count_max(&self) -> usize {
        self.count_max
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Producer handle for drivers running outside the service loop.
#[derive(Clone)]
pub struct InboundHandle {
    channel_id: u32,
    queue: Arc<InboundQueue>,
}

impl InboundHandle {
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// Queue a raw frame. A full queue drops the frame and returns `false`.
    pub fn push(&self, data: &[u8]) -> bool {
        let ok = self.queue.push(data);
        if !ok {
            log::warn!(
                "Channel[{}]: inbound queue full, dropped {} bytes",
                self.channel_id,
                data.len()
            );
        }
        ok
    }
}

// ── Channel ───────────────────────────────────────────────────

pub struct Channel {
    id: u32,
    protocol_name: String,
    interface_name: String,
    channel_name: String,
    settings: ChannelSettings,
    codec: Option<Box<dyn ProtocolCodec>>,
    no_codec_logged: bool,
    inbound: Arc<InboundQueue>,
    outbound: VecDeque<WireMessage>,
    outbound_peak: usize,
    send_fn: Box<dyn SendFn>,
    ready: Box<dyn ReadyPredicate>,
}

impl Channel {
    pub fn new(
        id: u32,
        protocol_name: &str,
        interface_name: &str,
        channel_name: &str,
        send_fn: Box<dyn SendFn>,
        ready: Box<dyn ReadyPredicate>,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            id,
            protocol_name: protocol_name.into(),
            interface_name: interface_name.into(),
            channel_name: channel_name.into(),
            settings,
            codec: None,
            no_codec_logged: false,
            inbound: Arc::new(InboundQueue::new(
                settings.inbound_queue_count_max,
                settings.inbound_queue_bytes_max,
            )),
            outbound: VecDeque::with_capacity(settings.outbound_queue_max_len),
            outbound_peak: 0,
            send_fn,
            ready,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn protocol_name(&self) -> &str {
        &self.protocol_name
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn has_codec(&self) -> bool {
        self.codec.is_some()
    }

    /// Create the codec on first use. Returns `false` if no factory matches
    /// the channel's protocol; that is logged once.
    pub fn ensure_codec(&mut self, registry: &CodecRegistry) -> bool {
        if self.codec.is_some() {
            return true;
        }
        match registry.find(&self.protocol_name) {
            Some(factory) => {
                self.codec = Some((factory.create)(self.id));
                log::info!(
                    "Channel[{}]: bound codec {} ({}/{})",
                    self.id,
                    factory.name,
                    self.interface_name,
                    self.channel_name
                );
                true
            }
            None => {
                if !self.no_codec_logged {
                    log::warn!(
                        "Channel[{}]: no codec for protocol {}",
                        self.id,
                        self.protocol_name
                    );
                    self.no_codec_logged = true;
                }
                false
            }
        }
    }

    pub fn inbound_handle(&self) -> InboundHandle {
        InboundHandle {
            channel_id: self.id,
            queue: Arc::clone(&self.inbound),
        }
    }

    pub fn queue_inbound(&self, data: &[u8]) -> bool {
        self.inbound_handle().push(data)
    }

    pub fn can_accept_inbound(&self) -> bool {
        self.inbound.can_accept(self.settings.inbound_block_len)
    }

    /// Append to the outbound FIFO. A full queue drops `msg`.
    pub fn queue_outbound(&mut self, msg: WireMessage) -> bool {
        if self.outbound.len() >= self.settings.outbound_queue_max_len {
            log::warn!(
                "Channel[{}]: outbound queue full ({}), dropped msg {}",
                self.id,
                self.outbound.len(),
                msg.msg_num
            );
            return false;
        }
        self.outbound.push_back(msg);
        self.outbound_peak = self.outbound_peak.max(self.outbound.len());
        true
    }

    pub fn pop_outbound(&mut self) -> Option<WireMessage> {
        self.outbound.pop_front()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn readiness(&mut self) -> Readiness {
        self.ready.readiness(self.id)
    }

    /// Frame `msg` with the bound codec and hand it to the driver.
    pub fn send_now(&mut self, msg: WireMessage) -> bool {
        let Some(codec) = self.codec.as_mut() else {
            return false;
        };
        match codec.encode_tx(msg) {
            Ok(framed) => self.send_fn.send(&framed),
            Err(e) => {
                log::warn!("Channel[{}]: encode failed: {}", self.id, e);
                false
            }
        }
    }

    /// Feed up to `max` queued frames to the codec.
    pub fn process_inbound(&mut self, max: usize, rx: &mut Vec<WireMessage>) -> usize {
        let Some(codec) = self.codec.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while handled < max {
            if !codec.ready_for_rx_data() {
                break;
            }
            let Some(frame) = self.inbound.pop() else {
                break;
            };
            codec.add_rx_data(&frame, rx);
            handled += 1;
        }
        handled
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn info_json(&self) -> Value {
        json!({
            "name": self.protocol_name,
            "if": self.interface_name,
            "ch": self.channel_name,
            "hdlr": u8::from(self.codec.is_some()),
            "chanID": self.codec.as_ref().map_or(-1, |c| i64::from(c.channel_id())),
            "inMax": self.inbound.count_max(),
            "inPk": self.inbound.peak(),
            "inBlk": self.settings.inbound_block_len,
            "outMax": self.settings.outbound_queue_max_len,
            "outPk": self.outbound_peak,
            "outBlk": self.settings.outbound_block_len,
        })
    }
}
