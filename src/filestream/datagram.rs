//! Real-time stream engine.
//!
//! No batching and no retries: each block either lands at the current
//! stream position or is rejected with a `sokto` telling the sender where
//! to resume. The stream ends when a block reaches the declared length
//! (if one was given) or when the owning session goes idle.

use crate::comms::ricrest::RicRestMsg;
use crate::comms::response::json_result;
use crate::error::TransferError;

use super::engine::{EngineCtx, Handled, StreamInfo, TransferEngine};
use super::{FileStreamBlock, FileStreamMsgType};

pub struct DatagramEngine {
    info: StreamInfo,
    stream_pos: u32,
}

impl DatagramEngine {
    pub fn new(info: StreamInfo) -> Self {
        Self { info, stream_pos: 0 }
    }

    /// Byte offset the next block must start at.
    pub fn stream_pos(&self) -> u32 {
        self.stream_pos
    }
}

impl TransferEngine for DatagramEngine {
    fn handle_cmd_frame(
        &mut self,
        msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        _ctx: &mut EngineCtx<'_>,
    ) -> Handled {
        log::debug!(
            "Datagram[{}]: {} {}",
            self.info.stream_id,
            msg_type.as_str(),
            self.info.name
        );
        Handled::ok(json_result(
            req.req(),
            true,
            &format!("\"streamID\":{}", self.info.stream_id),
        ))
    }

    fn handle_data_frame(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        let pos = req.buffer_pos();
        let data = req.bin();
        let len = data.len() as u32;
        let msg_stream_id = req.stream_id();
        let stream_len = self.info.len;
        let is_final = stream_len != 0 && pos + len >= stream_len;

        let status = if pos == self.stream_pos {
            let block = FileStreamBlock {
                name: &self.info.name,
                content_len: stream_len,
                file_pos: pos,
                data,
                first_block: pos == 0,
                final_block: is_final,
                crc16: None,
                file_len: (stream_len != 0).then_some(stream_len),
            };
            ctx.sink.write_block(&block)
        } else {
            Err(TransferError::PositionMismatch)
        };

        log::debug!(
            "Datagram[{}]: {} len {} pos {} expected {}",
            msg_stream_id,
            if status.is_ok() { "ok" } else { "rejected" },
            len,
            pos,
            self.stream_pos
        );

        let response = match status {
            Ok(()) => {
                self.stream_pos = pos + len;
                is_final.then(|| {
                    json_result(
                        req.req(),
                        true,
                        &format!("\"streamID\":{},\"sokto\":{}", msg_stream_id, self.stream_pos),
                    )
                })
            }
            Err(e @ (TransferError::Busy | TransferError::PositionMismatch)) => Some(json_result(
                req.req(),
                true,
                &format!(
                    "\"streamID\":{},\"sokto\":{},\"reason\":\"{}\"",
                    msg_stream_id,
                    self.stream_pos,
                    e.code()
                ),
            )),
            Err(e) => Some(json_result(
                req.req(),
                false,
                &format!("\"streamID\":{},\"reason\":\"{}\"", msg_stream_id, e.code()),
            )),
        };
        Handled { status, response }
    }

    fn service(&mut self, _ctx: &mut EngineCtx<'_>) {}

    fn is_active(&self) -> bool {
        true
    }

    fn debug_json(&self) -> String {
        "{}".into()
    }
}
