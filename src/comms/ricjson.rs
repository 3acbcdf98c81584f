//! RICJSON codec: each transport frame is a bare JSON command.
//!
//! Inbound frames become unnumbered `RawCmdFrame` commands; outbound
//! messages are sent as their payload with no header.

use super::codec::{CodecFactory, ProtocolCodec};
use super::message::{MsgProtocol, MsgType, WireMessage, MSG_NUM_UNNUMBERED};
use crate::error::CodecError;

pub const PROTOCOL_NAME: &str = "RICJSON";

pub const FACTORY: CodecFactory = CodecFactory::new(PROTOCOL_NAME, create);

fn create(channel_id: u32) -> Box<dyn ProtocolCodec> {
    Box::new(RicJsonCodec { channel_id })
}

pub struct RicJsonCodec {
    channel_id: u32,
}

impl ProtocolCodec for RicJsonCodec {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn channel_id(&self) -> u32 {
        self.channel_id
    }

    fn add_rx_data(&mut self, data: &[u8], rx: &mut Vec<WireMessage>) {
        // Tolerate a trailing NUL from C-string senders.
        let data = data.strip_suffix(&[0]).unwrap_or(data);
        if data.is_empty() {
            return;
        }
        rx.push(WireMessage::new(
            self.channel_id,
            MsgProtocol::RawCmdFrame,
            MSG_NUM_UNNUMBERED,
            MsgType::Command,
            data.to_vec(),
        ));
    }

    fn encode_tx(&mut self, msg: WireMessage) -> Result<WireMessage, CodecError> {
        Ok(msg)
    }
}
