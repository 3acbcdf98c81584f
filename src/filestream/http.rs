//! HTTP push engine.
//!
//! Blocks arrive already framed by an HTTP multipart upload and are written
//! straight through the session (`TransferSession::write_block_direct`),
//! so this engine only has to refuse channel frames.

use crate::comms::response::json_result;
use crate::comms::ricrest::RicRestMsg;
use crate::error::TransferError;

use super::engine::{EngineCtx, Handled, StreamInfo, TransferEngine};
use super::FileStreamMsgType;

pub struct HttpEngine {
    info: StreamInfo,
}

impl HttpEngine {
    pub fn new(info: StreamInfo) -> Self {
        Self { info }
    }

    fn refuse(&self, req: &RicRestMsg) -> Handled {
        log::warn!(
            "HTTP[{}]: channel frame {} for push upload {}",
            self.info.stream_id,
            req.req(),
            self.info.name
        );
        let reason = TransferError::InvalidOperation;
        Handled::err(
            reason,
            json_result(req.req(), false, &format!("\"reason\":\"{}\"", reason.code())),
        )
    }
}

impl TransferEngine for HttpEngine {
    fn handle_cmd_frame(
        &mut self,
        _msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        _ctx: &mut EngineCtx<'_>,
    ) -> Handled {
        self.refuse(req)
    }

    fn handle_data_frame(&mut self, req: &RicRestMsg, _ctx: &mut EngineCtx<'_>) -> Handled {
        self.refuse(req)
    }

    fn service(&mut self, _ctx: &mut EngineCtx<'_>) {}

    fn is_active(&self) -> bool {
        true
    }

    fn debug_json(&self) -> String {
        format!("{{\"strmID\":{},\"name\":{}}}", self.info.stream_id, serde_json::Value::from(self.info.name.as_str()))
    }
}
