//! RICSerial codec: HDLC-style byte stuffing over a raw byte stream.
//!
//! Wire format:
//! ```text
//! ┌──────┬──────────────────────────────────────────┬──────────┬──────┐
//! │ 0x7E │ RICFrame header + payload (stuffed)      │ CRC16 BE │ 0x7E │
//! └──────┴──────────────────────────────────────────┴──────────┴──────┘
//! ```
//!
//! Bytes equal to the boundary or escape octet are sent as
//! `0x7D, byte ^ 0x20`. The deframer accumulates bytes across calls, so a
//! single UART read may hold part of a frame or several frames back to
//! back.

use super::codec::{CodecFactory, ProtocolCodec};
use super::crc;
use super::message::WireMessage;
use super::ricframe;
use crate::error::CodecError;

pub const PROTOCOL_NAME: &str = "RICSerial";

pub const FRAME_BOUNDARY: u8 = 0x7e;
pub const CONTROL_ESCAPE: u8 = 0x7d;
const ESCAPE_XOR: u8 = 0x20;

/// Default frame limits (unstuffed bytes, including the CRC).
pub const DEFAULT_RX_MAX: usize = 5000;
pub const DEFAULT_TX_MAX: usize = 5000;

/// Frame check sequence length.
const FCS_LEN: usize = 2;

pub const FACTORY: CodecFactory = CodecFactory::new(PROTOCOL_NAME, create);

fn create(channel_id: u32) -> Box<dyn ProtocolCodec> {
    Box::new(RicSerialCodec::new(channel_id, DEFAULT_RX_MAX, DEFAULT_TX_MAX))
}

/// Deframer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HdlcStats {
    pub rx_frames: u32,
    pub crc_errors: u32,
    pub too_long: u32,
}

enum DeframerState {
    /// Waiting for the first boundary octet.
    Hunting,
    /// Collecting frame bytes.
    InFrame { escaped: bool },
    /// Frame overflowed; skip to the next boundary.
    Discarding,
}

/// Streaming HDLC deframer.
pub struct HdlcDeframer {
    state: DeframerState,
    buf: Vec<u8>,
    max_len: usize,
    stats: HdlcStats,
}

impl HdlcDeframer {
    pub fn new(max_len: usize) -> Self {
        Self {
            state: DeframerState::Hunting,
            buf: Vec::new(),
            max_len,
            stats: HdlcStats::default(),
        }
    }

    pub fn stats(&self) -> HdlcStats {
        self.stats
    }

    /// Feed bytes; `on_frame` gets each CRC-checked frame body (CRC stripped).
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(&[u8])) {
        for &byte in data {
            match &mut self.state {
                DeframerState::Hunting => {
                    if byte == FRAME_BOUNDARY {
                        self.start_frame();
                    }
                }
                DeframerState::Discarding => {
                    if byte == FRAME_BOUNDARY {
                        self.start_frame();
                    }
                }
                DeframerState::InFrame { escaped } => {
                    if byte == FRAME_BOUNDARY {
                        if self.buf.len() > FCS_LEN {
                            self.finish_frame(&mut on_frame);
                        }
                        // A boundary always opens the next frame.
                        self.start_frame();
                        continue;
                    }
                    if byte == CONTROL_ESCAPE {
                        *escaped = true;
                        continue;
                    }
                    let value = if *escaped { byte ^ ESCAPE_XOR } else { byte };
                    *escaped = false;
                    if self.buf.len() >= self.max_len {
                        self.stats.too_long += 1;
                        self.buf.clear();
                        self.state = DeframerState::Discarding;
                        continue;
                    }
                    self.buf.push(value);
                }
            }
        }
    }

    /// Drop any partial frame (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DeframerState::Hunting;
    }

    fn start_frame(&mut self) {
        self.buf.clear();
        self.state = DeframerState::InFrame { escaped: false };
    }

    fn finish_frame(&mut self, on_frame: &mut impl FnMut(&[u8])) {
        let body_len = self.buf.len() - FCS_LEN;
        let expected = u16::from_be_bytes([self.buf[body_len], self.buf[body_len + 1]]);
        if crc::crc16(&self.buf[..body_len]) != expected {
            self.stats.crc_errors += 1;
            return;
        }
        self.stats.rx_frames += 1;
        on_frame(&self.buf[..body_len]);
    }
}

fn push_stuffed(out: &mut Vec<u8>, byte: u8) {
    if byte == FRAME_BOUNDARY || byte == CONTROL_ESCAPE {
        out.push(CONTROL_ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

/// Stuff `body` and its CRC between boundary octets.
pub fn encode_hdlc(body: &[u8]) -> Vec<u8> {
    let fcs = crc::crc16(body).to_be_bytes();
    let mut out = Vec::with_capacity(body.len() + body.len() / 8 + 6);
    out.push(FRAME_BOUNDARY);
    for &b in body.iter().chain(fcs.iter()) {
        push_stuffed(&mut out, b);
    }
    out.push(FRAME_BOUNDARY);
    out
}

pub struct RicSerialCodec {
    channel_id: u32,
    deframer: HdlcDeframer,
    max_tx_len: usize,
}

impl RicSerialCodec {
    pub fn new(channel_id: u32, max_rx_len: usize, max_tx_len: usize) -> Self {
        log::info!(
            "RICSerial[{}]: maxRx {} maxTx {} boundary {:#04x} escape {:#04x}",
            channel_id,
            max_rx_len,
            max_tx_len,
            FRAME_BOUNDARY,
            CONTROL_ESCAPE
        );
        Self {
            channel_id,
            deframer: HdlcDeframer::new(max_rx_len),
            max_tx_len,
        }
    }

    pub fn stats(&self) -> HdlcStats {
        self.deframer.stats()
    }
}

impl ProtocolCodec for RicSerialCodec {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn channel_id(&self) -> u32 {
        self.channel_id
    }

    fn add_rx_data(&mut self, data: &[u8], rx: &mut Vec<WireMessage>) {
        let channel_id = self.channel_id;
        self.deframer.feed(data, |frame| {
            if let Some(msg) = ricframe::decode_frame(channel_id, frame) {
                rx.push(msg);
            }
        });
    }

    fn encode_tx(&mut self, mut msg: WireMessage) -> Result<WireMessage, CodecError> {
        let body = ricframe::encode_frame(&msg);
        let framed = encode_hdlc(&body);
        if framed.len() > self.max_tx_len {
            log::warn!(
                "RICSerial[{}]: encoded {} bytes exceeds max {}",
                self.channel_id,
                framed.len(),
                self.max_tx_len
            );
            return Err(CodecError::FrameTooLong {
                len: framed.len(),
                max: self.max_tx_len,
            });
        }
        msg.payload = framed;
        Ok(msg)
    }
}
