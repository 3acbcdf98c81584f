//! Channel message envelope.
//!
//! Every frame that crosses a channel boundary travels as a
//! [`WireMessage`]: inbound after a codec has deframed it, outbound before
//! a codec frames it.

/// Sentinel channel ID: deliver to every registered channel.
pub const CHANNEL_ID_ALL: u32 = 10_000;
/// Sentinel: channel not yet known.
pub const CHANNEL_ID_UNDEFINED: u32 = 0xffff;
/// Sentinel: request arrived through the REST API rather than a channel.
pub const CHANNEL_ID_REST_API: u32 = 0xfffe;

/// Sequence number carried by messages that are not numbered.
pub const MSG_NUM_UNNUMBERED: u32 = u32::MAX;

/// Protocol tag carried in the low 6 bits of the RICFrame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgProtocol {
    RosSerial = 0,
    Reserved1 = 1,
    RicRest = 2,
    RawCmdFrame = 0x3e,
    None = 0x3f,
}

impl MsgProtocol {
    pub const fn from_code(code: u8) -> Self {
        match code & 0x3f {
            0 => Self::RosSerial,
            1 => Self::Reserved1,
            2 => Self::RicRest,
            0x3e => Self::RawCmdFrame,
            _ => Self::None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RosSerial => "ROSSerial",
            Self::Reserved1 => "Reserved1",
            Self::RicRest => "RICREST",
            Self::RawCmdFrame => "RawCmdFrame",
            Self::None => "None",
        }
    }
}

/// Message direction / purpose, 2 bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Command = 0,
    Response = 1,
    Publish = 2,
    Report = 3,
}

impl MsgType {
    pub const fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Self::Command,
            1 => Self::Response,
            2 => Self::Publish,
            _ => Self::Report,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Response => "response",
            Self::Publish => "publish",
            Self::Report => "report",
        }
    }
}

/// One message on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub channel_id: u32,
    pub protocol: MsgProtocol,
    pub msg_num: u32,
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn new(
        channel_id: u32,
        protocol: MsgProtocol,
        msg_num: u32,
        msg_type: MsgType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            channel_id,
            protocol,
            msg_num,
            msg_type,
            payload,
        }
    }

    /// Unnumbered command with an empty payload, addressed to `channel_id`.
    pub fn command(channel_id: u32, protocol: MsgProtocol) -> Self {
        Self::new(channel_id, protocol, MSG_NUM_UNNUMBERED, MsgType::Command, Vec::new())
    }

    /// Address this message as the response to `req`.
    pub fn set_as_response(&mut self, req: &WireMessage) {
        self.channel_id = req.channel_id;
        self.protocol = req.protocol;
        self.msg_num = req.msg_num;
        self.msg_type = MsgType::Response;
    }

    /// Address this message explicitly (used for unsolicited responses).
    pub fn set_as_response_to(
        &mut self,
        channel_id: u32,
        protocol: MsgProtocol,
        msg_num: u32,
        msg_type: MsgType,
    ) {
        self.channel_id = channel_id;
        self.protocol = protocol;
        self.msg_num = msg_num;
        self.msg_type = msg_type;
    }

    pub fn is_publish(&self) -> bool {
        self.msg_type == MsgType::Publish
    }

    pub fn is_numbered(&self) -> bool {
        self.msg_num != MSG_NUM_UNNUMBERED
    }
}
