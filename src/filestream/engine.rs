//! Transfer engine contract and the closed set of engines.
//!
//! A session picks one engine at creation and keeps it for its lifetime:
//!
//! | content          | flow          | engine     |
//! |------------------|---------------|------------|
//! | File / Firmware  | HttpUpload    | `Http`     |
//! | File / Firmware  | CommsChannel  | `Okto`     |
//! | RtStream         | any           | `Datagram` |

use crate::comms::ricrest::RicRestMsg;
use crate::comms::transport::Outbound;
use crate::config::UploadConfig;
use crate::error::TransferError;

use super::datagram::DatagramEngine;
use super::http::HttpEngine;
use super::okto::OktoEngine;
use super::sink::BlockSink;
use super::{ContentType, FileStreamMsgType, FlowType};

/// Identity of the transfer an engine serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_id: u32,
    pub channel_id: u32,
    pub name: String,
    pub content: ContentType,
    /// Declared length; 0 when unknown.
    pub len: u32,
}

/// What an engine may touch during one call.
pub struct EngineCtx<'a> {
    pub now_ms: u64,
    /// Inbound block length the channel advertises; 0 if unknown.
    pub channel_block_max: u32,
    /// Unsolicited messages (acks on timeout, cancel notices).
    pub out: &'a mut dyn Outbound,
    pub sink: &'a mut dyn BlockSink,
}

/// Result of handling one frame: the status plus the JSON to answer with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handled {
    pub status: Result<(), TransferError>,
    pub response: Option<String>,
}

impl Handled {
    pub fn ok(response: impl Into<Option<String>>) -> Self {
        Self {
            status: Ok(()),
            response: response.into(),
        }
    }

    pub fn err(e: TransferError, response: impl Into<Option<String>>) -> Self {
        Self {
            status: Err(e),
            response: response.into(),
        }
    }
}

pub trait TransferEngine {
    /// Start / end / cancel.
    fn handle_cmd_frame(
        &mut self,
        msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        ctx: &mut EngineCtx<'_>,
    ) -> Handled;

    /// One file/stream block.
    fn handle_data_frame(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled;

    /// Timeouts and retries; called once per tick.
    fn service(&mut self, ctx: &mut EngineCtx<'_>);

    fn is_active(&self) -> bool;

    fn debug_json(&self) -> String;
}

pub enum Engine {
    Okto(OktoEngine),
    Http(HttpEngine),
    Datagram(DatagramEngine),
}

impl Engine {
    pub fn for_stream(info: StreamInfo, flow: FlowType, cfg: &UploadConfig) -> Self {
        match (info.content, flow) {
            (ContentType::RtStream, _) => Self::Datagram(DatagramEngine::new(info)),
            (_, FlowType::HttpUpload) => Self::Http(HttpEngine::new(info)),
            (_, FlowType::CommsChannel) => Self::Okto(OktoEngine::new(info, *cfg)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Okto(_) => "okto",
            Self::Http(_) => "http",
            Self::Datagram(_) => "datagram",
        }
    }

    fn inner(&mut self) -> &mut dyn TransferEngine {
        match self {
            Self::Okto(e) => e,
            Self::Http(e) => e,
            Self::Datagram(e) => e,
        }
    }

    fn inner_ref(&self) -> &dyn TransferEngine {
        match self {
            Self::Okto(e) => e,
            Self::Http(e) => e,
            Self::Datagram(e) => e,
        }
    }
}

impl TransferEngine for Engine {
    fn handle_cmd_frame(
        &mut self,
        msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        ctx: &mut EngineCtx<'_>,
    ) -> Handled {
        self.inner().handle_cmd_frame(msg_type, req, ctx)
    }

    fn handle_data_frame(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        self.inner().handle_data_frame(req, ctx)
    }

    fn service(&mut self, ctx: &mut EngineCtx<'_>) {
        self.inner().service(ctx);
    }

    fn is_active(&self) -> bool {
        self.inner_ref().is_active()
    }

    fn debug_json(&self) -> String {
        self.inner_ref().debug_json()
    }
}
