//! RICREST element frames.
//!
//! The first byte of every RICREST payload is an element code selecting
//! the frame shape:
//!
//! ```text
//! ┌──────┬───────────────────────────────────────────────────────┐
//! │ code │ body                                                  │
//! ├──────┼───────────────────────────────────────────────────────┤
//! │ 0    │ url: request string [NUL]                             │
//! │ 1    │ cmdRespJson: JSON string [NUL]                        │
//! │ 2    │ body: u32 BE pos │ u32 BE total │ binary              │
//! │ 3    │ commandFrame: JSON [NUL binary]                       │
//! │ 4    │ fileBlock: u32 BE (streamID<<24 | pos) │ binary       │
//! └──────┴───────────────────────────────────────────────────────┘
//! ```
//!
//! Fixed header sizes live in [`LAYOUT`]; decoding validates the header
//! length from the table before any field is read.

use serde_json::Value;

use super::cursor::Cursor;
use crate::error::DecodeError;

/// Longest url / response / command JSON kept from a frame.
pub const MAX_PAYLOAD_LEN: usize = 5000;
/// Largest total body size accepted in a body element.
pub const MAX_REST_BODY_SIZE: u32 = 5000;

/// Synthetic request names for elements that carry no request string.
pub const REQ_RESPONSE: &str = "resp";
pub const REQ_BODY: &str = "elemBody";
pub const REQ_FILE_BLOCK: &str = "ufBlock";
pub const REQ_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementCode {
    Url = 0,
    CmdRespJson = 1,
    Body = 2,
    CommandFrame = 3,
    FileBlock = 4,
}

/// How the bytes after the fixed header are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// NUL-terminated text, truncated to the payload limit.
    Text,
    /// JSON text, optionally followed by NUL and a binary blob.
    JsonThenBinary,
    /// Raw binary.
    Binary,
}

/// Fixed shape of one element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    pub code: ElementCode,
    /// Bytes of fixed header after the element code.
    pub header_len: usize,
    pub body: BodyKind,
}

/// Element layout table, indexed by element code.
pub const LAYOUT: [FrameShape; 5] = [
    FrameShape {
        code: ElementCode::Url,
        header_len: 0,
        body: BodyKind::Text,
    },
    FrameShape {
        code: ElementCode::CmdRespJson,
        header_len: 0,
        body: BodyKind::Text,
    },
    FrameShape {
        code: ElementCode::Body,
        header_len: 8,
        body: BodyKind::Binary,
    },
    FrameShape {
        code: ElementCode::CommandFrame,
        header_len: 0,
        body: BodyKind::JsonThenBinary,
    },
    FrameShape {
        code: ElementCode::FileBlock,
        header_len: 4,
        body: BodyKind::Binary,
    },
];

impl ElementCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        LAYOUT.get(code as usize).map(|shape| shape.code)
    }

    pub const fn shape(self) -> FrameShape {
        LAYOUT[self as usize]
    }

    /// Fixed header bytes between the element code and the body.
    pub const fn header_len(self) -> usize {
        self.shape().header_len
    }
}

/// A decoded RICREST element.
#[derive(Debug, Clone, PartialEq)]
pub struct RicRestMsg {
    elem_code: ElementCode,
    req: String,
    /// Url / response text, or the JSON part of a command frame.
    text: String,
    json: Value,
    bin: Vec<u8>,
    buffer_pos: u32,
    total_bytes: u32,
    stream_id: u32,
}

impl RicRestMsg {
    /// Decode with the default payload limit.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_with_limit(buf, MAX_PAYLOAD_LEN)
    }

    pub fn decode_with_limit(buf: &[u8], max_payload: usize) -> Result<Self, DecodeError> {
        let mut cur = Cursor::new(buf);
        let code = cur.read_u8().map_err(|_| DecodeError::Empty)?;
        let elem_code = ElementCode::from_u8(code).ok_or(DecodeError::UnknownElementCode(code))?;
        let shape = elem_code.shape();
        if cur.remaining() < shape.header_len {
            return Err(DecodeError::Truncated {
                needed: 1 + shape.header_len,
                available: buf.len(),
            });
        }

        let mut msg = Self {
            elem_code,
            req: String::new(),
            text: String::new(),
            json: Value::Null,
            bin: Vec::new(),
            buffer_pos: 0,
            total_bytes: 0,
            stream_id: 0,
        };

        // Fixed header fields
        match elem_code {
            ElementCode::Body => {
                let mut pos = cur.read_u32_be()?;
                let total = cur.read_u32_be()?.min(MAX_REST_BODY_SIZE);
                if pos > total {
                    pos = 0;
                }
                msg.buffer_pos = pos;
                msg.total_bytes = total;
                msg.req = REQ_BODY.into();
            }
            ElementCode::FileBlock => {
                let packed = cur.read_u32_be()?;
                msg.stream_id = packed >> 24;
                msg.buffer_pos = packed & 0x00ff_ffff;
                msg.req = REQ_FILE_BLOCK.into();
            }
            _ => {}
        }

        // Body
        match shape.body {
            BodyKind::Text => {
                msg.text = truncated_str(cur.read_until_nul(), max_payload);
                msg.req = if elem_code == ElementCode::CmdRespJson {
                    REQ_RESPONSE.into()
                } else {
                    msg.text.clone()
                };
            }
            BodyKind::JsonThenBinary => {
                msg.text = truncated_str(cur.read_until_nul(), max_payload);
                msg.bin = cur.rest().to_vec();
                msg.json = serde_json::from_str(&msg.text).unwrap_or(Value::Null);
                msg.req = msg
                    .json
                    .get("cmdName")
                    .and_then(Value::as_str)
                    .unwrap_or(REQ_UNKNOWN)
                    .into();
            }
            BodyKind::Binary => {
                msg.bin = cur.rest().to_vec();
            }
        }
        Ok(msg)
    }

    pub fn elem_code(&self) -> ElementCode {
        self.elem_code
    }

    /// Request name: the url, the command name, or a synthetic tag.
    pub fn req(&self) -> &str {
        &self.req
    }

    /// Url / response text, or command-frame JSON text.
    pub fn payload_text(&self) -> &str {
        &self.text
    }

    /// Parsed command-frame JSON (`Null` for other elements or bad JSON).
    pub fn payload_json(&self) -> &Value {
        &self.json
    }

    pub fn bin(&self) -> &[u8] {
        &self.bin
    }

    pub fn buffer_pos(&self) -> u32 {
        self.buffer_pos
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

fn truncated_str(bytes: &[u8], max: usize) -> String {
    let bytes = &bytes[..bytes.len().min(max)];
    String::from_utf8_lossy(bytes).into_owned()
}

// ── Encoding ──────────────────────────────────────────────────

/// `[code][text][NUL]`
pub fn encode_str(text: &str, code: ElementCode) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(code as u8);
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

/// `[code][bytes]` with no terminator.
pub fn encode_bytes(bytes: &[u8], code: ElementCode) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(code as u8);
    out.extend_from_slice(bytes);
    out
}

/// Command frame: JSON, and when `bin` is non-empty a NUL then `bin`.
pub fn encode_cmd_frame(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(json.len() + bin.len() + 2);
    out.push(ElementCode::CommandFrame as u8);
    out.extend_from_slice(json.as_bytes());
    if !bin.is_empty() {
        out.push(0);
        out.extend_from_slice(bin);
    }
    out
}

/// File/stream block; `pos` keeps its low 24 bits.
pub fn encode_file_block(stream_id: u8, pos: u32, data: &[u8]) -> Vec<u8> {
    let packed = (u32::from(stream_id) << 24) | (pos & 0x00ff_ffff);
    let mut out = Vec::with_capacity(data.len() + 5);
    out.push(ElementCode::FileBlock as u8);
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Body fragment.
pub fn encode_body(pos: u32, total: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 9);
    out.push(ElementCode::Body as u8);
    out.extend_from_slice(&pos.to_be_bytes());
    out.extend_from_slice(&total.to_be_bytes());
    out.extend_from_slice(data);
    out
}
