//! Protocol codec abstraction and the factory registry.
//!
//! A codec turns raw channel bytes into [`WireMessage`]s and frames
//! outbound messages back into bytes. Codecs are created lazily, one per
//! channel, from the factory whose name matches the channel's protocol.
//!
//! ```text
//!  raw bytes ──▶ add_rx_data ──▶ WireMessage(s) ──▶ hub
//!  WireMessage ──▶ encode_tx ──▶ framed WireMessage ──▶ SendFn
//! ```

use super::message::WireMessage;
use crate::error::CodecError;

/// One protocol codec bound to one channel.
pub trait ProtocolCodec: Send {
    /// Name used to match a channel's declared protocol.
    fn protocol_name(&self) -> &'static str;

    fn channel_id(&self) -> u32;

    /// Feed raw inbound bytes; each complete frame is pushed to `rx`.
    fn add_rx_data(&mut self, data: &[u8], rx: &mut Vec<WireMessage>);

    /// Frame an outbound message. The returned message carries the framed
    /// bytes as its payload and keeps the original addressing.
    fn encode_tx(&mut self, msg: WireMessage) -> Result<WireMessage, CodecError>;

    /// Whether the codec can take another inbound frame this tick.
    fn ready_for_rx_data(&self) -> bool {
        true
    }
}

/// Constructor for a codec instance on a given channel.
pub type CodecCreateFn = fn(channel_id: u32) -> Box<dyn ProtocolCodec>;

/// A named codec constructor.
#[derive(Clone, Copy)]
pub struct CodecFactory {
    pub name: &'static str,
    pub create: CodecCreateFn,
}

impl CodecFactory {
    pub const fn new(name: &'static str, create: CodecCreateFn) -> Self {
        Self { name, create }
    }
}

impl core::fmt::Debug for CodecFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CodecFactory").field("name", &self.name).finish()
    }
}

/// Explicit registry of codec factories; populated at construction, owned
/// by the channel manager.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    factories: Vec<CodecFactory>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registry holding the RICSerial, RICFrame and RICJSON codecs.
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.add(super::ricserial::FACTORY);
        reg.add(super::ricframe::FACTORY);
        reg.add(super::ricjson::FACTORY);
        reg
    }

    /// Register a factory. A later factory with the same name replaces the
    /// earlier one.
    pub fn add(&mut self, factory: CodecFactory) {
        if let Some(existing) = self
            .factories
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(factory.name))
        {
            *existing = factory;
        } else {
            self.factories.push(factory);
        }
    }

    /// Case-insensitive lookup by protocol name.
    pub fn find(&self, name: &str) -> Option<&CodecFactory> {
        self.factories
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
