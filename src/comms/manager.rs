//! Channel manager: owns every channel and pumps their queues.
//!
//! ```text
//!            register_channel()            service() per tick
//!  driver ─────────────────────▶ ┌─────────────────────────────┐
//!                                │ ChannelManager              │
//!  handle_inbound(id, bytes) ──▶ │  channels[id]  (append-only)│──▶ rx: Vec<WireMessage>
//!  handle_outbound(msg) ───────▶ │  CodecRegistry              │──▶ SendFn
//!                                └─────────────────────────────┘
//! ```
//!
//! Channel IDs are indices into an append-only vector, so an ID stays
//! valid for the life of the manager and is never reused.

use super::channel::{Channel, InboundHandle};
use super::codec::{CodecFactory, CodecRegistry};
use super::message::{CHANNEL_ID_ALL, WireMessage};
use super::transport::{Outbound, Readiness, ReadyPredicate, SendFn};
use crate::config::ChannelSettings;

/// Inbound frames moved into each codec per tick.
pub const MAX_INBOUND_MSGS_IN_LOOP: usize = 1;

pub struct ChannelManager {
    channels: Vec<Channel>,
    registry: CodecRegistry,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    /// Manager with the built-in codecs registered.
    pub fn new() -> Self {
        Self::with_registry(CodecRegistry::with_builtin())
    }

    pub fn with_registry(registry: CodecRegistry) -> Self {
        Self {
            channels: Vec::new(),
            registry,
        }
    }

    /// Register a codec constructor; replaces one with the same name.
    pub fn add_protocol(&mut self, factory: CodecFactory) {
        log::info!("ChanMgr: protocol {} registered", factory.name);
        self.registry.add(factory);
    }

    pub fn register_channel(
        &mut self,
        protocol_name: &str,
        interface_name: &str,
        channel_name: &str,
        send_fn: impl SendFn + 'static,
        ready: impl ReadyPredicate + 'static,
        settings: ChannelSettings,
    ) -> u32 {
        let id = self.channels.len() as u32;
        self.channels.push(Channel::new(
            id,
            protocol_name,
            interface_name,
            channel_name,
            Box::new(send_fn),
            Box::new(ready),
            settings,
        ));
        log::info!(
            "ChanMgr: registered channel {} protocol {} if {} ch {}",
            id,
            protocol_name,
            interface_name,
            channel_name
        );
        id
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_valid(&self, channel_id: u32) -> bool {
        (channel_id as usize) < self.channels.len()
    }

    pub fn channel(&self, channel_id: u32) -> Option<&Channel> {
        self.channels.get(channel_id as usize)
    }

    fn channel_mut(&mut self, channel_id: u32) -> Option<&mut Channel> {
        self.channels.get_mut(channel_id as usize)
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Queue raw bytes received on `channel_id`. Returns `false` if the
    /// channel is unknown, has no codec or its queue is full.
    pub fn handle_inbound(&mut self, channel_id: u32, data: &[u8]) -> bool {
        let registry = &self.registry;
        let Some(channel) = self.channels.get_mut(channel_id as usize) else {
            log::warn!("ChanMgr: inbound on invalid channel {}", channel_id);
            return false;
        };
        if !channel.ensure_codec(registry) {
            return false;
        }
        channel.queue_inbound(data)
    }

    /// Producer handle for a driver running in another context.
    pub fn inbound_handle(&self, channel_id: u32) -> Option<InboundHandle> {
        self.channel(channel_id).map(Channel::inbound_handle)
    }

    pub fn can_accept_inbound(&self, channel_id: u32) -> bool {
        self.channel(channel_id)
            .is_some_and(Channel::can_accept_inbound)
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Route `msg` to its channel, or to every channel for
    /// [`CHANNEL_ID_ALL`].
    pub fn handle_outbound(&mut self, msg: WireMessage) {
        if msg.channel_id == CHANNEL_ID_ALL {
            for id in 0..self.channels.len() as u32 {
                let mut copy = msg.clone();
                copy.channel_id = id;
                self.route_outbound(copy);
            }
            return;
        }
        if !self.is_valid(msg.channel_id) {
            log::warn!(
                "ChanMgr: outbound to invalid channel {} ({} {})",
                msg.channel_id,
                msg.protocol.as_str(),
                msg.msg_type.as_str()
            );
            return;
        }
        self.route_outbound(msg);
    }

    fn route_outbound(&mut self, msg: WireMessage) {
        let registry = &self.registry;
        let Some(channel) = self.channels.get_mut(msg.channel_id as usize) else {
            return;
        };
        if !msg.is_publish() {
            channel.queue_outbound(msg);
            return;
        }
        // Publish: latest wins, never queued.
        if !channel.ensure_codec(registry) {
            return;
        }
        if channel.readiness() == Readiness::Ready {
            channel.send_now(msg);
        } else {
            log::debug!("ChanMgr: channel {} not ready, publish dropped", channel.id());
        }
    }

    // ── Service ───────────────────────────────────────────────

    /// Pump every channel once. Decoded inbound messages are appended to
    /// `rx` for the caller to dispatch.
    pub fn service(&mut self, rx: &mut Vec<WireMessage>) {
        let registry = &self.registry;
        for channel in self.channels.iter_mut() {
            let readiness = channel.readiness();
            if readiness != Readiness::Busy {
                if let Some(msg) = channel.pop_outbound() {
                    if readiness == Readiness::Ready {
                        if channel.ensure_codec(registry) {
                            channel.send_now(msg);
                        }
                    } else {
                        log::debug!(
                            "ChanMgr: channel {} no connection, discarded msg {}",
                            channel.id(),
                            msg.msg_num
                        );
                    }
                }
            }
            // Frames pushed through an InboundHandle may arrive before any codec exists
            if channel.inbound_len() > 0 && channel.ensure_codec(registry) {
                channel.process_inbound(MAX_INBOUND_MSGS_IN_LOOP, rx);
            }
        }
    }

    // ── Lookups ───────────────────────────────────────────────

    /// Channel whose channel name and protocol both match, ignoring case.
    pub fn channel_id_by_name(&self, channel_name: &str, protocol_name: &str) -> Option<u32> {
        self.channels
            .iter()
            .find(|c| {
                c.channel_name().eq_ignore_ascii_case(channel_name)
                    && c.protocol_name().eq_ignore_ascii_case(protocol_name)
            })
            .map(Channel::id)
    }

    /// Every channel on the named interface, ignoring case.
    pub fn channel_ids_by_interface(&self, interface_name: &str) -> Vec<u32> {
        self.channels
            .iter()
            .filter(|c| c.interface_name().eq_ignore_ascii_case(interface_name))
            .map(Channel::id)
            .collect()
    }

    pub fn inbound_block_len(&self, channel_id: u32, default: usize) -> usize {
        self.channel(channel_id)
            .map_or(default, |c| c.settings().inbound_block_len)
    }

    pub fn outbound_block_len(&self, channel_id: u32, default: usize) -> usize {
        self.channel(channel_id)
            .map_or(default, |c| c.settings().outbound_block_len)
    }

    /// JSON array describing every channel.
    pub fn info_json(&self) -> String {
        let all: Vec<_> = self.channels.iter().map(Channel::info_json).collect();
        serde_json::Value::Array(all).to_string()
    }
}

impl Outbound for ChannelManager {
    fn send_msg(&mut self, msg: WireMessage) {
        self.handle_outbound(msg);
    }
}
