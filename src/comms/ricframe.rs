//! RICFrame codec: one transport frame is one message.
//!
//! ```text
//! ┌──────────┬───────────────────────────┬──────────────┐
//! │ msg_num  │ type<<6 │ protocol & 0x3f │ payload …    │
//! │ u8       │ u8                        │              │
//! └──────────┴───────────────────────────┴──────────────┘
//! ```
//!
//! Used on transports that already preserve message boundaries (BLE
//! characteristic writes, web-socket binary frames).

use super::codec::{CodecFactory, ProtocolCodec};
use super::message::{MsgProtocol, MsgType, WireMessage};
use crate::error::CodecError;

pub const PROTOCOL_NAME: &str = "RICFrame";

/// Header bytes before the payload.
pub const HEADER_LEN: usize = 2;

pub const FACTORY: CodecFactory = CodecFactory::new(PROTOCOL_NAME, create);

fn create(channel_id: u32) -> Box<dyn ProtocolCodec> {
    Box::new(RicFrameCodec::new(channel_id))
}

pub struct RicFrameCodec {
    channel_id: u32,
}

impl RicFrameCodec {
    pub fn new(channel_id: u32) -> Self {
        Self { channel_id }
    }
}

/// Parse `[msg_num][type|protocol][payload]`; `None` if shorter than the header.
pub fn decode_frame(channel_id: u32, frame: &[u8]) -> Option<WireMessage> {
    if frame.len() < HEADER_LEN {
        return None;
    }
    let msg_num = u32::from(frame[0]);
    let protocol = MsgProtocol::from_code(frame[1] & 0x3f);
    let msg_type = MsgType::from_code(frame[1] >> 6);
    Some(WireMessage::new(
        channel_id,
        protocol,
        msg_num,
        msg_type,
        frame[HEADER_LEN..].to_vec(),
    ))
}

/// Prepend the two-byte header to `msg.payload`.
pub fn encode_frame(msg: &WireMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(msg.payload.len() + HEADER_LEN);
    out.push(msg.msg_num as u8);
    out.push(header_byte(msg));
    out.extend_from_slice(&msg.payload);
    out
}

pub(crate) fn header_byte(msg: &WireMessage) -> u8 {
    (((msg.msg_type as u8) & 0x03) << 6) | ((msg.protocol as u8) & 0x3f)
}

impl ProtocolCodec for RicFrameCodec {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn channel_id(&self) -> u32 {
        self.channel_id
    }

    fn add_rx_data(&mut self, data: &[u8], rx: &mut Vec<WireMessage>) {
        match decode_frame(self.channel_id, data) {
            Some(msg) => rx.push(msg),
            None => log::warn!(
                "RICFrame[{}]: frame too short ({} bytes)",
                self.channel_id,
                data.len()
            ),
        }
    }

    fn encode_tx(&mut self, mut msg: WireMessage) -> Result<WireMessage, CodecError> {
        msg.payload = encode_frame(&msg);
        Ok(msg)
    }
}
