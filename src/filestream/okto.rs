//! OKTO chunked-upload engine.
//!
//! The host streams fixed-size blocks and the device acknowledges in
//! batches with `okto` = the next byte offset it expects:
//!
//! ```text
//!  host                                   device
//!   │ ufStart {fileLen, batchMsgSize, ..}   │
//!   │──────────────────────────────────────▶│ negotiate block / batch
//!   │◀──────────── ok {batchMsgSize, batchAckSize, streamID}
//!   │ block @0                              │
//!   │──────────────────────────────────────▶│ first block ⇒ ack
//!   │◀──────────── {"okto":N}               │
//!   │ block … block (batchAckSize)          │
//!   │──────────────────────────────────────▶│ batch full ⇒ ack
//!   │◀──────────── {"okto":N}               │
//!   │ final block                           │ final ⇒ ack
//!   │ ufEnd                                 │
//! ```
//!
//! Out-of-order blocks are logged and dropped without failing the
//! transfer; the host resends from the last `okto` when its ack arrives
//! or when the device re-sends that ack after a quiet period.

use serde_json::json;

use crate::comms::message::{MsgProtocol, MsgType};
use crate::comms::response::{cmd_resp_msg, json_result, json_result_with_error, str_field};
use crate::comms::ricrest::{REQ_FILE_BLOCK, RicRestMsg};
use crate::config::UploadConfig;
use crate::error::TransferError;

use super::engine::{EngineCtx, Handled, StreamInfo, TransferEngine};
use super::{ContentType, FileStreamBlock, FileStreamMsgType, json_str, json_u32};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
    Completed,
    Cancelled,
}

/// Outcome of checking one block against the expected position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCheck {
    pub valid: bool,
    pub first: bool,
    pub last: bool,
    pub ack_due: bool,
}

pub struct OktoEngine {
    info: StreamInfo,
    cfg: UploadConfig,
    state: UploadState,
    req_str: String,
    crc16: Option<u16>,

    block_size: u32,
    batch_ack_size: u32,
    expected_pos: u32,
    batch_block_count: u32,
    batch_retry: u32,

    start_ms: u64,
    last_msg_ms: u64,
    block_count: u32,
    bytes_count: u32,
}

impl OktoEngine {
    pub fn new(info: StreamInfo, cfg: UploadConfig) -> Self {
        Self {
            info,
            block_size: cfg.block_size_default,
            batch_ack_size: cfg.batch_ack_default,
            cfg,
            state: UploadState::Idle,
            req_str: String::new(),
            crc16: None,
            expected_pos: 0,
            batch_block_count: 0,
            batch_retry: 0,
            start_ms: 0,
            last_msg_ms: 0,
            block_count: 0,
            bytes_count: 0,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn is_uploading(&self) -> bool {
        self.state == UploadState::Uploading
    }

    /// Next byte offset expected from the host.
    pub fn ack_value(&self) -> u32 {
        self.expected_pos
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn batch_ack_size(&self) -> u32 {
        self.batch_ack_size
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn crc16(&self) -> Option<u16> {
        self.crc16
    }

    /// Request string the host attached to `ufStart`.
    pub fn req_str(&self) -> &str {
        &self.req_str
    }

    // ── Start ─────────────────────────────────────────────────

    fn handle_start(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        let json = req.payload_json();
        let crc_str = json_str(json, "CRC16");
        let host_block = json_u32(json, "batchMsgSize").filter(|&v| v > 0);
        let host_batch = json_u32(json, "batchAckSize").filter(|&v| v > 0);

        let status = if self.is_uploading() && self.expected_pos > 0 {
            log::warn!(
                "OKTO[{}]: start refused, {} already at {}",
                self.info.stream_id,
                self.info.name,
                self.expected_pos
            );
            Err(TransferError::AlreadyInProgress)
        } else {
            self.req_str = json_str(json, "reqStr").into();
            self.info.name = json_str(json, "fileName").into();
            self.info.len = json_u32(json, "fileLen").unwrap_or(0);
            self.crc16 = (!crc_str.is_empty()).then(|| parse_c_ulong(crc_str) as u16);
            self.reset_counters(ctx.now_ms);
            self.state = UploadState::Uploading;
            self.negotiate(host_block, host_batch, ctx.channel_block_max);
            log::info!(
                "OKTO[{}]: start {} len {} blkSize {} batchAck {} chanMax {} crc {:?}",
                self.info.stream_id,
                self.info.name,
                self.info.len,
                self.block_size,
                self.batch_ack_size,
                ctx.channel_block_max,
                self.crc16
            );
            Ok(())
        };

        let extra = format!(
            "\"batchMsgSize\":{},\"batchAckSize\":{},\"streamID\":{}",
            self.block_size, self.batch_ack_size, self.info.stream_id
        );
        let error = if status.is_err() { "uploadInProgress" } else { "" };
        let response = json_result_with_error(req.req(), status.is_ok(), error, &extra);
        Handled {
            status,
            response: Some(response),
        }
    }

    fn reset_counters(&mut self, now_ms: u64) {
        self.start_ms = now_ms;
        self.last_msg_ms = now_ms;
        self.block_count = 0;
        self.bytes_count = 0;
        self.expected_pos = 0;
        self.batch_block_count = 0;
        self.batch_retry = 0;
    }

    fn negotiate(&mut self, host_block: Option<u32>, host_batch: Option<u32>, chan_max: u32) {
        self.block_size = host_block.unwrap_or(self.cfg.block_size_default);
        self.batch_ack_size = host_batch.unwrap_or(self.cfg.batch_ack_default);
        if chan_max > 0 && self.block_size > chan_max {
            self.block_size = chan_max * 3 / 2;
        }
        let batch_bytes = u64::from(self.block_size) * u64::from(self.batch_ack_size);
        if batch_bytes > u64::from(self.cfg.max_total_bytes_in_batch) {
            self.batch_ack_size = (self.cfg.max_total_bytes_in_batch / self.block_size).max(1);
        }
    }

    // ── Blocks ────────────────────────────────────────────────

    /// Book-keeping for one received block; does not touch the sink.
    pub fn validate_block(&mut self, pos: u32, len: u32, now_ms: u64) -> BlockCheck {
        let mut check = BlockCheck::default();
        self.batch_block_count += 1;
        self.last_msg_ms = now_ms;

        if pos != self.expected_pos {
            log::warn!(
                "OKTO[{}]: unexpected pos {} != {} blocks {} batch {}/{}",
                self.info.stream_id,
                pos,
                self.expected_pos,
                self.block_count,
                self.batch_block_count,
                self.batch_ack_size
            );
        } else {
            check.valid = true;
            self.expected_pos += len;
            self.block_count += 1;
            self.bytes_count += len;
            check.first = pos == 0;
            check.last = pos + len >= self.info.len;
        }

        check.ack_due =
            self.batch_block_count == self.batch_ack_size || self.block_count == 1 || check.last;
        if check.ack_due {
            self.batch_block_count = 0;
        }
        self.batch_retry = 0;
        check
    }

    fn okto_fragment(&self) -> String {
        format!("\"okto\":{}", self.expected_pos)
    }

    // ── End / cancel ──────────────────────────────────────────

    /// Abandon the upload. A `reason` is echoed to the host as `ufCancel`.
    pub fn cancel(&mut self, reason: Option<&str>, ctx: &mut EngineCtx<'_>) {
        self.state = UploadState::Cancelled;
        ctx.sink.cancel_end(false);
        let Some(reason) = reason else {
            return;
        };
        log::warn!("OKTO[{}]: cancel {}", self.info.stream_id, reason);
        let extra = format!("\"cmdName\":\"ufCancel\",{}", str_field("reason", reason));
        let mut msg = cmd_resp_msg(&json_result("", true, &extra));
        msg.set_as_response_to(self.info.channel_id, MsgProtocol::RicRest, 0, MsgType::Response);
        ctx.out.send_msg(msg);
    }

    fn handle_end(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        ctx.sink.cancel_end(true);
        log::info!(
            "OKTO[{}]: end {} blocks {} bytes {} hostBlocks {}",
            self.info.stream_id,
            self.info.name,
            self.block_count,
            self.bytes_count,
            json_u32(req.payload_json(), "blockCount").unwrap_or(0)
        );
        self.state = UploadState::Completed;
        Handled::ok(json_result(req.req(), true, ""))
    }

    fn handle_cancel_msg(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        let reason = json_str(req.payload_json(), "reason");
        self.cancel((!reason.is_empty()).then_some(reason), ctx);
        Handled::ok(json_result(req.req(), true, ""))
    }

    fn rate(count: u32, elapsed_ms: u64) -> f64 {
        if elapsed_ms == 0 {
            return 0.0;
        }
        let r = 1000.0 * f64::from(count) / elapsed_ms as f64;
        (r * 10.0).round() / 10.0
    }
}

impl TransferEngine for OktoEngine {
    fn handle_cmd_frame(
        &mut self,
        msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        ctx: &mut EngineCtx<'_>,
    ) -> Handled {
        match msg_type {
            FileStreamMsgType::Start => self.handle_start(req, ctx),
            FileStreamMsgType::End => self.handle_end(req, ctx),
            FileStreamMsgType::Cancel => self.handle_cancel_msg(req, ctx),
        }
    }

    fn handle_data_frame(&mut self, req: &RicRestMsg, ctx: &mut EngineCtx<'_>) -> Handled {
        if !self.is_uploading() {
            self.cancel(Some("failBlockUnexpected"), ctx);
            return Handled::err(TransferError::NotUploading, None);
        }

        let pos = req.buffer_pos();
        let data = req.bin();
        let check = self.validate_block(pos, data.len() as u32, ctx.now_ms);

        let mut response = None;
        if check.ack_due {
            response = Some(json_result(req.req(), true, &self.okto_fragment()));
            log::debug!(
                "OKTO[{}]: ack okto {} pos {} len {}",
                self.info.stream_id,
                self.expected_pos,
                pos,
                data.len()
            );
        }
        if !check.valid {
            return Handled::ok(response);
        }

        let block = FileStreamBlock {
            name: &self.info.name,
            content_len: self.info.len,
            file_pos: pos,
            data,
            first_block: check.first,
            final_block: check.last,
            crc16: self.crc16,
            file_len: Some(self.info.len),
        };
        if let Err(e) = ctx.sink.write_block(&block) {
            let (status_reason, cancel_reason) = match self.info.content {
                ContentType::Firmware if check.first => ("OTAWriteFailed", "failOTAStart"),
                ContentType::Firmware => ("OTAWriteFailed", "failOTAWrite"),
                _ => ("FileWriteFailed", "failFileWrite"),
            };
            let extra = format!("\"cmdName\":\"ufStatus\",{}", str_field("reason", status_reason));
            let fail = json_result(req.req(), false, &extra);
            self.cancel(Some(cancel_reason), ctx);
            return Handled::err(e, fail);
        }
        Handled::ok(response)
    }

    fn service(&mut self, ctx: &mut EngineCtx<'_>) {
        if !self.is_uploading() {
            return;
        }
        let now = ctx.now_ms;
        let timeout = if self.block_count < 2 {
            self.cfg.first_msg_timeout_ms
        } else {
            self.cfg.block_msgs_timeout_ms
        };
        if now.saturating_sub(self.last_msg_ms) > timeout {
            self.batch_retry += 1;
            if self.batch_retry < self.cfg.max_retries {
                log::warn!(
                    "OKTO[{}]: timeout, resending okto {} retry {}",
                    self.info.stream_id,
                    self.expected_pos,
                    self.batch_retry
                );
                self.last_msg_ms = now;
                let mut msg = cmd_resp_msg(&json_result(REQ_FILE_BLOCK, true, &self.okto_fragment()));
                msg.set_as_response_to(
                    self.info.channel_id,
                    MsgProtocol::RicRest,
                    0,
                    MsgType::Response,
                );
                ctx.out.send_msg(msg);
            } else {
                self.cancel(Some("failRetries"), ctx);
            }
        }
        if self.is_uploading() && now.saturating_sub(self.start_ms) > self.cfg.upload_fail_timeout_ms {
            self.cancel(Some("failTimeout"), ctx);
        }
    }

    fn is_active(&self) -> bool {
        self.is_uploading()
    }

    fn debug_json(&self) -> String {
        let elapsed = self.last_msg_ms.saturating_sub(self.start_ms);
        json!({
            "actv": u8::from(self.is_uploading()),
            "msgRate": Self::rate(self.block_count, elapsed),
            "dataBps": Self::rate(self.bytes_count, elapsed),
            "bytes": self.bytes_count,
            "blks": self.block_count,
            "blkSize": self.block_size,
            "strmID": self.info.stream_id,
            "name": self.info.name,
        })
        .to_string()
    }
}

/// Parse an unsigned integer the way C `strtoul(s, NULL, 0)` does: `0x`
/// prefix for hex, a leading `0` for octal, otherwise decimal. Parsing
/// stops at the first invalid digit; no digits gives 0.
pub fn parse_c_ulong(s: &str) -> u32 {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    digits
        .chars()
        .map_while(|c| c.to_digit(radix))
        .fold(0u32, |acc, d| acc.wrapping_mul(radix).wrapping_add(d))
}
