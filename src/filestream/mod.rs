//! File and stream transfer: sessions and the engines they own.
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  ufStart ─────▶ │ TransferSession                          │
//!  ufBlock ─────▶ │  Engine::{Okto | Http | Datagram}        │
//!  ufEnd   ─────▶ │        │ write_block / cancel_end        │
//!                 │        ▼                                 │
//!                 │  SessionSink ──▶ FirmwareUpdater         │
//!                 │              ──▶ FileWriter              │
//!                 │              ──▶ router stream sink      │
//!                 └──────────────────────────────────────────┘
//! ```

use serde_json::Value;

use crate::comms::ricrest::RicRestMsg;

pub mod datagram;
pub mod engine;
pub mod firmware;
pub mod http;
pub mod okto;
pub mod session;
pub mod sink;

pub use engine::{Engine, EngineCtx, Handled, TransferEngine};
pub use session::TransferSession;
pub use sink::BlockSink;

/// Concurrent sessions the hub will hold.
pub const MAX_SESSIONS: usize = 3;

/// Stream ID meaning "any / not yet assigned".
pub const STREAM_ID_ANY: u32 = 0;
pub const STREAM_ID_MIN: u32 = 1;
/// Exclusive upper bound; IDs wrap back to [`STREAM_ID_MIN`] here.
pub const STREAM_ID_MAX: u32 = 255;

// ── Classification ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    File,
    Firmware,
    RtStream,
}

impl ContentType {
    /// Map a `fileType` field. Unknown or empty values mean a file.
    pub fn from_file_type(s: &str) -> Self {
        if s.eq_ignore_ascii_case("fw") || s.eq_ignore_ascii_case("ricfw") {
            Self::Firmware
        } else if s.eq_ignore_ascii_case("rtstream") {
            Self::RtStream
        } else {
            Self::File
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Firmware => "firmware",
            Self::RtStream => "realTimeStream",
        }
    }
}

/// How a transfer was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Blocks pushed by an HTTP-style multipart upload.
    HttpUpload,
    /// Negotiated over a channel with start/end control frames.
    CommsChannel,
}

impl FlowType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HttpUpload => "httpUpload",
            Self::CommsChannel => "commsChannel",
        }
    }
}

/// File/stream control verb carried in a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStreamMsgType {
    Start,
    End,
    Cancel,
}

impl FileStreamMsgType {
    pub fn from_cmd_name(cmd_name: &str) -> Option<Self> {
        if cmd_name.eq_ignore_ascii_case("ufStart") {
            Some(Self::Start)
        } else if cmd_name.eq_ignore_ascii_case("ufEnd") {
            Some(Self::End)
        } else if cmd_name.eq_ignore_ascii_case("ufCancel") {
            Some(Self::Cancel)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "ufStart",
            Self::End => "ufEnd",
            Self::Cancel => "ufCancel",
        }
    }
}

/// Fields a control frame carries about its transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStreamMsgInfo {
    pub msg_type: FileStreamMsgType,
    pub name: String,
    pub content: ContentType,
    pub stream_id: u32,
    pub endpoint: String,
    pub file_len: u32,
}

impl FileStreamMsgInfo {
    /// `None` when the command frame is not a file/stream verb.
    pub fn parse(msg: &RicRestMsg) -> Option<Self> {
        let json = msg.payload_json();
        let cmd_name = json_str(json, "cmdName");
        let msg_type = FileStreamMsgType::from_cmd_name(cmd_name)?;
        Some(Self {
            msg_type,
            name: json_str(json, "fileName").into(),
            content: ContentType::from_file_type(json_str(json, "fileType")),
            stream_id: json_u32(json, "streamID").unwrap_or(STREAM_ID_ANY),
            endpoint: json_str(json, "endpoint").into(),
            file_len: json_u32(json, "fileLen").unwrap_or(0),
        })
    }
}

pub(crate) fn json_str<'a>(json: &'a Value, key: &str) -> &'a str {
    json.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Integer field; numeric strings are accepted too.
pub(crate) fn json_u32(json: &Value, key: &str) -> Option<u32> {
    match json.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ── Block ─────────────────────────────────────────────────────

/// One block on its way from an engine to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStreamBlock<'a> {
    pub name: &'a str,
    pub content_len: u32,
    pub file_pos: u32,
    pub data: &'a [u8],
    pub first_block: bool,
    pub final_block: bool,
    pub crc16: Option<u16>,
    /// Declared total length, when known.
    pub file_len: Option<u32>,
}

impl FileStreamBlock<'_> {
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
