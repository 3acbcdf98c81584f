//! One transfer in flight.
//!
//! ```text
//!   ExchangeHub ──▶ TransferSession ──▶ Engine ──▶ SessionSink
//!                        │                            │
//!                        │ idle timeout               ├─▶ FirmwareUpdater
//!                        ▼                            ├─▶ FileWriter
//!                   is_active = false                 └─▶ router stream sink
//! ```
//!
//! The session owns its engine and its bookkeeping separately so the
//! engine can run while the sink borrows the bookkeeping.

use crate::comms::ricrest::RicRestMsg;
use crate::comms::transport::Outbound;
use crate::config::ExchangeConfig;
use crate::error::TransferError;
use crate::ports::{FileStore, FileWriter, FirmwareUpdater, RequestRouter};

use super::engine::{Engine, EngineCtx, Handled, StreamInfo, TransferEngine};
use super::sink::BlockSink;
use super::{ContentType, FileStreamBlock, FileStreamMsgType, FlowType};

/// Ports and channel facts a session needs for one call.
pub struct SessionCtx<'a> {
    pub now_ms: u64,
    pub channel_block_max: u32,
    pub out: &'a mut dyn Outbound,
    pub firmware: &'a mut dyn FirmwareUpdater,
    pub router: &'a mut dyn RequestRouter,
}

struct SessionState {
    info: StreamInfo,
    flow: FlowType,
    endpoint: String,
    is_active: bool,
    /// Ended normally or already cancelled; nothing left to abort.
    ended: bool,
    /// This session opened the firmware updater.
    fw_started: bool,
    file: Option<Box<dyn FileWriter>>,
    idle_timeout_ms: u64,
    last_active_ms: u64,
    start_ms: u64,
    total_bytes: u64,
    total_chunks: u32,
}

pub struct TransferSession {
    engine: Engine,
    state: SessionState,
}

impl TransferSession {
    pub fn new(
        info: StreamInfo,
        flow: FlowType,
        endpoint: &str,
        cfg: &ExchangeConfig,
        now_ms: u64,
        files: &mut dyn FileStore,
        router: &mut dyn RequestRouter,
    ) -> Self {
        let mut is_active = true;
        let mut file = None;
        match info.content {
            ContentType::File => match files.create(&info.name, info.len) {
                Ok(w) => file = Some(w),
                Err(e) => log::warn!("FSSess[{}]: cannot open {}: {}", info.stream_id, info.name, e),
            },
            ContentType::RtStream => {
                if router.stream_sink(endpoint).is_none() {
                    log::warn!("FSSess[{}]: no stream endpoint {}", info.stream_id, endpoint);
                    is_active = false;
                }
            }
            ContentType::Firmware => {}
        }

        log::info!(
            "FSSess[{}]: new {} {} {} chan {} endpoint {}",
            info.stream_id,
            info.content.as_str(),
            flow.as_str(),
            info.name,
            info.channel_id,
            endpoint
        );

        Self {
            engine: Engine::for_stream(info.clone(), flow, &cfg.upload),
            state: SessionState {
                info,
                flow,
                endpoint: endpoint.into(),
                is_active,
                ended: false,
                fw_started: false,
                file,
                idle_timeout_ms: cfg.session_idle_timeout_ms,
                last_active_ms: now_ms,
                start_ms: now_ms,
                total_bytes: 0,
                total_chunks: 0,
            },
        }
    }

    fn with_engine<R>(
        &mut self,
        ctx: &mut SessionCtx<'_>,
        f: impl FnOnce(&mut Engine, &mut EngineCtx<'_>) -> R,
    ) -> R {
        let mut sink = SessionSink {
            state: &mut self.state,
            firmware: &mut *ctx.firmware,
            router: &mut *ctx.router,
            now_ms: ctx.now_ms,
        };
        let mut ectx = EngineCtx {
            now_ms: ctx.now_ms,
            channel_block_max: ctx.channel_block_max,
            out: &mut *ctx.out,
            sink: &mut sink,
        };
        f(&mut self.engine, &mut ectx)
    }

    // ── Frames ────────────────────────────────────────────────

    pub fn handle_cmd_frame(
        &mut self,
        msg_type: FileStreamMsgType,
        req: &RicRestMsg,
        ctx: &mut SessionCtx<'_>,
    ) -> Handled {
        let handled = self.with_engine(ctx, |engine, ectx| engine.handle_cmd_frame(msg_type, req, ectx));
        if !self.engine.is_active() {
            self.state.is_active = false;
        }
        handled
    }

    pub fn handle_data_frame(&mut self, req: &RicRestMsg, ctx: &mut SessionCtx<'_>) -> Handled {
        self.with_engine(ctx, |engine, ectx| engine.handle_data_frame(req, ectx))
    }

    /// Write a block that arrived outside any engine (HTTP push).
    pub fn write_block_direct(
        &mut self,
        block: &FileStreamBlock<'_>,
        ctx: &mut SessionCtx<'_>,
    ) -> Result<(), TransferError> {
        let mut sink = SessionSink {
            state: &mut self.state,
            firmware: &mut *ctx.firmware,
            router: &mut *ctx.router,
            now_ms: ctx.now_ms,
        };
        sink.write_block(block)
    }

    pub fn service(&mut self, ctx: &mut SessionCtx<'_>) {
        self.with_engine(ctx, |engine, ectx| engine.service(ectx));
        if self.state.is_active
            && ctx.now_ms.saturating_sub(self.state.last_active_ms) > self.state.idle_timeout_ms
        {
            log::warn!(
                "FSSess[{}]: idle timeout {}",
                self.state.info.stream_id,
                self.state.info.name
            );
            self.state.is_active = false;
        }
    }

    /// Abort whatever the sinks still hold. Called when the session is
    /// removed; a transfer that already ended is left alone.
    pub fn close(&mut self, firmware: &mut dyn FirmwareUpdater, router: &mut dyn RequestRouter) {
        if self.state.ended {
            return;
        }
        let mut sink = SessionSink {
            state: &mut self.state,
            firmware,
            router,
            now_ms: 0,
        };
        sink.cancel_end(false);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn stream_id(&self) -> u32 {
        self.state.info.stream_id
    }

    pub fn channel_id(&self) -> u32 {
        self.state.info.channel_id
    }

    pub fn name(&self) -> &str {
        &self.state.info.name
    }

    pub fn content(&self) -> ContentType {
        self.state.info.content
    }

    pub fn flow(&self) -> FlowType {
        self.state.flow
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.total_bytes
    }

    pub fn total_chunks(&self) -> u32 {
        self.state.total_chunks
    }

    /// Time from the first accepted block to now.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state.start_ms)
    }

    pub fn is_firmware_update(&self) -> bool {
        self.is_active() && self.content() == ContentType::Firmware
    }

    pub fn is_file_system_activity(&self) -> bool {
        self.is_active() && self.content() == ContentType::File
    }

    pub fn is_streaming(&self) -> bool {
        self.is_active() && self.content() == ContentType::RtStream
    }

    pub fn debug_json(&self) -> String {
        self.engine.debug_json()
    }
}

// ── Sink adapter ──────────────────────────────────────────────

/// Routes engine output to the port matching the session's content.
struct SessionSink<'a> {
    state: &'a mut SessionState,
    firmware: &'a mut dyn FirmwareUpdater,
    router: &'a mut dyn RequestRouter,
    now_ms: u64,
}

impl SessionSink<'_> {
    fn write_firmware(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        if block.first_block {
            let len = block.file_len.unwrap_or(block.content_len);
            if let Err(e) = self.firmware.start(block.name, len) {
                log::warn!("FSSess: firmware start {} len {} failed: {}", block.name, len, e);
                return Err(TransferError::CannotStart);
            }
            self.state.fw_started = true;
        }
        self.firmware.write_block(block)
    }

    fn write_file(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        let Some(file) = self.state.file.as_mut() else {
            return Err(TransferError::InvalidOperation);
        };
        file.write(block.file_pos, block.data)?;
        if block.final_block {
            file.finish(true);
            self.state.file = None;
        }
        Ok(())
    }

    fn write_stream(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        match self.router.stream_sink(&self.state.endpoint) {
            Some(sink) => sink.write_block(block),
            None => Err(TransferError::InvalidOperation),
        }
    }
}

impl BlockSink for SessionSink<'_> {
    fn write_block(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
        self.state.last_active_ms = self.now_ms;

        let result = match self.state.info.content {
            ContentType::Firmware => self.write_firmware(block),
            ContentType::File => self.write_file(block),
            ContentType::RtStream => self.write_stream(block),
        };

        log::debug!(
            "FSSess[{}]: block pos {} len {} first {} final {} -> {:?}",
            self.state.info.stream_id,
            block.file_pos,
            block.len(),
            block.first_block,
            block.final_block,
            result
        );

        match result {
            Ok(()) => {
                if block.first_block {
                    self.state.start_ms = self.now_ms;
                }
                self.state.total_chunks += 1;
                self.state.total_bytes += u64::from(block.len());
                if block.final_block {
                    self.state.is_active = false;
                    self.state.ended = true;
                }
            }
            Err(TransferError::Busy) => {}
            Err(_) => self.state.is_active = false,
        }
        result
    }

    fn cancel_end(&mut self, is_normal_end: bool) {
        self.state.is_active = false;
        self.state.ended = true;
        match self.state.info.content {
            ContentType::Firmware => {
                if self.state.fw_started {
                    self.firmware.cancel_end(is_normal_end);
                }
            }
            ContentType::File => {
                if let Some(mut file) = self.state.file.take() {
                    file.finish(is_normal_end);
                }
            }
            ContentType::RtStream => {
                if let Some(sink) = self.router.stream_sink(&self.state.endpoint) {
                    sink.cancel_end(is_normal_end);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::message::WireMessage;
    use crate::comms::ricrest::{encode_cmd_frame, encode_file_block};
    use crate::filestream::sink::MemorySink;
    use crate::ports::ApiSource;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Fw {
        refuse: bool,
        started: u32,
        blocks: u32,
        ended: Option<bool>,
    }

    impl FirmwareUpdater for Fw {
        fn start(&mut self, _name: &str, _len: u32) -> Result<(), TransferError> {
            if self.refuse {
                return Err(TransferError::AlreadyInProgress);
            }
            self.started += 1;
            Ok(())
        }
        fn write_block(&mut self, _block: &FileStreamBlock<'_>) -> Result<(), TransferError> {
            self.blocks += 1;
            Ok(())
        }
        fn cancel_end(&mut self, is_normal_end: bool) {
            self.ended = Some(is_normal_end);
        }
        fn is_busy(&self) -> bool {
            self.started > 0 && self.ended.is_none()
        }
    }

    #[derive(Default)]
    struct FileLog {
        data: Vec<u8>,
        finished: Option<bool>,
    }

    struct Writer(Rc<RefCell<FileLog>>);

    impl FileWriter for Writer {
        fn write(&mut self, _pos: u32, data: &[u8]) -> Result<(), TransferError> {
            self.0.borrow_mut().data.extend_from_slice(data);
            Ok(())
        }
        fn finish(&mut self, is_normal_end: bool) {
            self.0.borrow_mut().finished = Some(is_normal_end);
        }
    }

    #[derive(Default)]
    struct Files(Rc<RefCell<FileLog>>);

    impl FileStore for Files {
        fn create(&mut self, _name: &str, _len: u32) -> Result<Box<dyn FileWriter>, TransferError> {
            Ok(Box::new(Writer(self.0.clone())))
        }
    }

    #[derive(Default)]
    struct Router {
        audio: Option<MemorySink>,
    }

    impl RequestRouter for Router {
        fn handle_request(&mut self, _req: &str, _body: Option<&[u8]>, _src: ApiSource) -> Option<String> {
            None
        }
        fn stream_sink(&mut self, endpoint: &str) -> Option<&mut dyn BlockSink> {
            match (endpoint, self.audio.as_mut()) {
                ("audio", Some(s)) => Some(s),
                _ => None,
            }
        }
    }

    struct Rig {
        fw: Fw,
        files: Files,
        router: Router,
        out: Vec<WireMessage>,
        now: u64,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                fw: Fw::default(),
                files: Files::default(),
                router: Router::default(),
                out: Vec::new(),
                now: 100,
            }
        }

        fn session(&mut self, content: ContentType, flow: FlowType, len: u32) -> TransferSession {
            let info = StreamInfo {
                stream_id: 1,
                channel_id: 0,
                name: "f.bin".into(),
                content,
                len,
            };
            TransferSession::new(
                info,
                flow,
                "audio",
                &ExchangeConfig::default(),
                self.now,
                &mut self.files,
                &mut self.router,
            )
        }

        fn ctx(&mut self) -> SessionCtx<'_> {
            SessionCtx {
                now_ms: self.now,
                channel_block_max: 0,
                out: &mut self.out,
                firmware: &mut self.fw,
                router: &mut self.router,
            }
        }
    }

    fn cmd(json: &str) -> (FileStreamMsgType, RicRestMsg) {
        let req = RicRestMsg::decode(&encode_cmd_frame(json, &[])).unwrap();
        (FileStreamMsgType::from_cmd_name(req.req()).unwrap(), req)
    }

    fn block(pos: u32, data: &[u8]) -> RicRestMsg {
        RicRestMsg::decode(&encode_file_block(1, pos, data)).unwrap()
    }

    const START: &str = r#"{"cmdName":"ufStart","fileName":"f.bin","fileLen":8,"batchMsgSize":4,"batchAckSize":1}"#;

    #[test]
    fn file_upload_reaches_writer_and_ends_session() {
        let mut rig = Rig::new();
        let mut s = rig.session(ContentType::File, FlowType::CommsChannel, 8);
        let (t, req) = cmd(START);
        assert_eq!(s.handle_cmd_frame(t, &req, &mut rig.ctx()).status, Ok(()));
        s.handle_data_frame(&block(0, b"abcd"), &mut rig.ctx());
        assert!(s.is_active());
        assert!(s.is_file_system_activity());
        s.handle_data_frame(&block(4, b"efgh"), &mut rig.ctx());
        assert!(!s.is_active());
        let log = rig.files.0.borrow();
        assert_eq!(log.data, b"abcdefgh");
        assert_eq!(log.finished, Some(true));
        assert_eq!(s.total_bytes(), 8);
        assert_eq!(s.total_chunks(), 2);
    }

    #[test]
    fn firmware_first_block_starts_updater() {
        let mut rig = Rig::new();
        let mut s = rig.session(ContentType::Firmware, FlowType::CommsChannel, 8);
        let (t, req) = cmd(START);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        s.handle_data_frame(&block(0, b"abcd"), &mut rig.ctx());
        assert_eq!(rig.fw.started, 1);
        assert_eq!(rig.fw.blocks, 1);
        assert!(s.is_firmware_update());
    }

    #[test]
    fn firmware_refusal_cancels_session() {
        let mut rig = Rig::new();
        rig.fw.refuse = true;
        let mut s = rig.session(ContentType::Firmware, FlowType::CommsChannel, 8);
        let (t, req) = cmd(START);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        let h = s.handle_data_frame(&block(0, b"abcd"), &mut rig.ctx());
        assert_eq!(h.status, Err(TransferError::CannotStart));
        assert!(!s.is_active());
        assert_eq!(rig.fw.blocks, 0);
        // The updater was never opened by this session, so it is not told
        assert_eq!(rig.fw.ended, None);
    }

    #[test]
    fn host_cancel_marks_inactive() {
        let mut rig = Rig::new();
        let mut s = rig.session(ContentType::File, FlowType::CommsChannel, 8);
        let (t, req) = cmd(START);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        let (t, req) = cmd(r#"{"cmdName":"ufCancel"}"#);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        assert!(!s.is_active());
        assert_eq!(rig.files.0.borrow().finished, Some(false));
    }

    #[test]
    fn rt_stream_without_endpoint_starts_inactive() {
        let mut rig = Rig::new();
        let s = rig.session(ContentType::RtStream, FlowType::CommsChannel, 0);
        assert!(!s.is_active());
    }

    #[test]
    fn rt_stream_busy_keeps_session() {
        let mut rig = Rig::new();
        rig.router.audio = Some(MemorySink::new());
        let mut s = rig.session(ContentType::RtStream, FlowType::CommsChannel, 0);
        assert!(s.is_streaming());
        s.handle_data_frame(&block(0, b"xx"), &mut rig.ctx());
        if let Some(a) = rig.router.audio.as_mut() {
            a.fail_with = Some(TransferError::Busy);
        }
        let h = s.handle_data_frame(&block(2, b"yy"), &mut rig.ctx());
        assert_eq!(h.status, Err(TransferError::Busy));
        assert!(s.is_active());
        assert_eq!(rig.router.audio.as_ref().map(|a| a.data.len()), Some(2));
    }

    #[test]
    fn idle_timeout_deactivates() {
        let mut rig = Rig::new();
        rig.router.audio = Some(MemorySink::new());
        let mut s = rig.session(ContentType::RtStream, FlowType::CommsChannel, 0);
        rig.now += 10_000;
        s.service(&mut rig.ctx());
        assert!(s.is_active());
        rig.now += 1;
        s.service(&mut rig.ctx());
        assert!(!s.is_active());
    }

    #[test]
    fn blocks_reset_idle_clock() {
        let mut rig = Rig::new();
        rig.router.audio = Some(MemorySink::new());
        let mut s = rig.session(ContentType::RtStream, FlowType::CommsChannel, 0);
        rig.now += 9_000;
        s.handle_data_frame(&block(0, b"xx"), &mut rig.ctx());
        rig.now += 9_000;
        s.service(&mut rig.ctx());
        assert!(s.is_active());
    }

    #[test]
    fn close_aborts_unfinished_file() {
        let mut rig = Rig::new();
        let mut s = rig.session(ContentType::File, FlowType::HttpUpload, 8);
        let blk = FileStreamBlock {
            name: "f.bin",
            content_len: 8,
            file_pos: 0,
            data: b"abcd",
            first_block: true,
            final_block: false,
            crc16: None,
            file_len: Some(8),
        };
        assert_eq!(s.write_block_direct(&blk, &mut rig.ctx()), Ok(()));
        s.close(&mut rig.fw, &mut rig.router);
        assert_eq!(rig.files.0.borrow().finished, Some(false));
    }

    #[test]
    fn close_after_normal_end_is_noop() {
        let mut rig = Rig::new();
        let mut s = rig.session(ContentType::Firmware, FlowType::CommsChannel, 8);
        let (t, req) = cmd(START);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        s.handle_data_frame(&block(0, b"abcd"), &mut rig.ctx());
        let (t, req) = cmd(r#"{"cmdName":"ufEnd"}"#);
        s.handle_cmd_frame(t, &req, &mut rig.ctx());
        assert_eq!(rig.fw.ended, Some(true));
        s.close(&mut rig.fw, &mut rig.router);
        assert_eq!(rig.fw.ended, Some(true));
    }
}
