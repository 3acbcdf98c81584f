//! Exchange hub: routes decoded channel messages to the request router
//! or to transfer sessions, and owns the session table.
//!
//! ```text
//!  ChannelManager ──rx──▶ ExchangeHub::process_endpoint_msg
//!                            │ RICREST url / body ─────────▶ RequestRouter
//!                            │ RICREST cmd frame
//!                            │    ├─ ufStart/ufEnd/ufCancel ─▶ TransferSession
//!                            │    └─ other cmdName ─────────▶ RequestRouter
//!                            │ RICREST file block ─────────▶ TransferSession
//!                            │ RawCmdFrame ───────────────▶ RequestRouter
//!                            ▼
//!  ChannelManager ◀──tx── response (same channel, same msg_num)
//! ```
//!
//! One `service()` call pumps the manager, feeds every decoded message
//! through the hub, services each session and reaps at most one
//! inactive session.

pub mod body;
pub mod query;

use crate::comms::manager::ChannelManager;
use crate::comms::message::{MsgProtocol, WireMessage};
use crate::comms::response::{json_result, response_to};
use crate::comms::ricrest::{ElementCode, RicRestMsg};
use crate::config::ExchangeConfig;
use crate::error::TransferError;
use crate::events::{Activity, TransferEvent};
use crate::filestream::engine::StreamInfo;
use crate::filestream::session::SessionCtx;
use crate::filestream::{
    ContentType, FileStreamBlock, FileStreamMsgInfo, FileStreamMsgType, FlowType, Handled,
    STREAM_ID_ANY, STREAM_ID_MAX, STREAM_ID_MIN, TransferSession,
};
use crate::ports::{ApiSource, Clock, HubPorts};

use body::BodyAssembler;

pub struct ExchangeHub {
    manager: ChannelManager,
    config: ExchangeConfig,
    clock: Box<dyn Clock>,
    sessions: Vec<TransferSession>,
    next_stream_id: u32,
    bodies: BodyAssembler,
    activity: Activity,
}

fn session_ctx<'a>(
    manager: &'a mut ChannelManager,
    ports: &'a mut HubPorts<'_>,
    now_ms: u64,
    channel_block_max: u32,
) -> SessionCtx<'a> {
    SessionCtx {
        now_ms,
        channel_block_max,
        out: manager,
        firmware: &mut *ports.firmware,
        router: &mut *ports.router,
    }
}

impl ExchangeHub {
    pub fn new(manager: ChannelManager, config: ExchangeConfig, clock: impl Clock + 'static) -> Self {
        Self {
            manager,
            config,
            clock: Box::new(clock),
            sessions: Vec::with_capacity(config.max_sessions),
            next_stream_id: STREAM_ID_MIN,
            bodies: BodyAssembler::new(),
            activity: Activity::default(),
        }
    }

    pub fn manager(&self) -> &ChannelManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ChannelManager {
        &mut self.manager
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn sessions(&self) -> &[TransferSession] {
        &self.sessions
    }

    /// Stream ID the next new session will get.
    pub fn next_stream_id(&self) -> u32 {
        self.next_stream_id
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    fn block_max(&self, channel_id: u32) -> u32 {
        self.manager
            .inbound_block_len(channel_id, self.config.upload.block_size_default as usize)
            as u32
    }

    // ── Service loop ──────────────────────────────────────────

    pub fn service(&mut self, ports: &mut HubPorts<'_>) {
        let mut rx = Vec::new();
        self.manager.service(&mut rx);
        for msg in &rx {
            self.process_endpoint_msg(msg, ports);
        }

        let now = self.clock.now_ms();
        for session in &mut self.sessions {
            let block_max = self
                .manager
                .inbound_block_len(session.channel_id(), self.config.upload.block_size_default as usize)
                as u32;
            let mut ctx = session_ctx(&mut self.manager, ports, now, block_max);
            session.service(&mut ctx);
        }

        // One per tick
        if let Some(i) = self.sessions.iter().position(|s| !s.is_active()) {
            let mut session = self.sessions.remove(i);
            session.close(&mut *ports.firmware, &mut *ports.router);
            log::info!(
                "Exchange: session {} {} closed, {} bytes in {} blocks",
                session.stream_id(),
                session.name(),
                session.total_bytes(),
                session.total_chunks()
            );
            ports.events.emit(&TransferEvent::SessionClosed {
                stream_id: session.stream_id(),
                name: session.name().into(),
            });
        }

        let activity = self.sessions.iter().fold(Activity::default(), |a, s| Activity {
            firmware: a.firmware || s.is_firmware_update(),
            file_system: a.file_system || s.is_file_system_activity(),
            streaming: a.streaming || s.is_streaming(),
        });
        if activity != self.activity {
            self.activity = activity;
            ports.events.emit(&TransferEvent::ActivityChanged(activity));
        }
    }

    // ── Endpoint messages ─────────────────────────────────────

    /// Handle one decoded message and send any response back on its channel.
    pub fn process_endpoint_msg(&mut self, msg: &WireMessage, ports: &mut HubPorts<'_>) {
        match msg.protocol {
            MsgProtocol::RicRest => self.process_ricrest(msg, ports),
            MsgProtocol::RawCmdFrame => self.process_raw_cmd_frame(msg, ports),
            other => log::debug!(
                "Exchange: ignoring {} msg on chan {}",
                other.as_str(),
                msg.channel_id
            ),
        }
    }

    fn process_ricrest(&mut self, msg: &WireMessage, ports: &mut HubPorts<'_>) {
        let req = match RicRestMsg::decode_with_limit(&msg.payload, self.config.max_payload_len) {
            Ok(req) => req,
            Err(e) => {
                log::warn!("Exchange: chan {} RICREST {}", msg.channel_id, e);
                return;
            }
        };

        let channel_id = msg.channel_id;
        let response = match req.elem_code() {
            ElementCode::Url => {
                let body = self.bodies.take_complete(channel_id);
                ports
                    .router
                    .handle_request(req.req(), body.as_deref(), ApiSource::new(channel_id))
            }
            ElementCode::Body => {
                self.bodies
                    .feed(channel_id, req.buffer_pos(), req.total_bytes(), req.bin());
                None
            }
            ElementCode::CmdRespJson => {
                log::warn!("Exchange: chan {} sent a response element; ignored", channel_id);
                None
            }
            ElementCode::CommandFrame => self.process_cmd_frame(&req, channel_id, ports).response,
            ElementCode::FileBlock => self.process_file_block(&req, channel_id, ports).response,
        };

        if let Some(resp) = response.filter(|r| !r.is_empty()) {
            self.manager.handle_outbound(response_to(msg, &resp));
        }
    }

    fn process_raw_cmd_frame(&mut self, msg: &WireMessage, ports: &mut HubPorts<'_>) {
        let json: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap_or_default();
        let req = query::request_from_json(&json);
        log::debug!("Exchange: raw cmd frame {} on chan {}", req, msg.channel_id);
        let Some(resp) = ports
            .router
            .handle_request(&req, None, ApiSource::new(msg.channel_id))
            .filter(|r| !r.is_empty())
        else {
            return;
        };
        let mut out = WireMessage::command(msg.channel_id, MsgProtocol::RawCmdFrame);
        out.payload = resp.into_bytes();
        out.set_as_response(msg);
        self.manager.handle_outbound(out);
    }

    /// Command frame: a transfer verb for a session, or a router request.
    pub fn process_cmd_frame(
        &mut self,
        req: &RicRestMsg,
        channel_id: u32,
        ports: &mut HubPorts<'_>,
    ) -> Handled {
        let Some(info) = FileStreamMsgInfo::parse(req) else {
            let request = query::request_from_json(req.payload_json());
            return Handled::ok(ports.router.handle_request(
                &request,
                None,
                ApiSource::new(channel_id),
            ));
        };

        let found = match info.msg_type {
            FileStreamMsgType::Start => self.find_or_create_session(
                &info.name,
                channel_id,
                info.content,
                &info.endpoint,
                FlowType::CommsChannel,
                info.file_len,
                ports,
            ),
            _ => self.find_session(info.stream_id, Some(&info.name), channel_id),
        };

        let Some(idx) = found else {
            return match info.msg_type {
                FileStreamMsgType::Start => Handled::err(
                    TransferError::InsufficientResource,
                    json_result(
                        req.req(),
                        false,
                        &format!("\"reason\":\"{}\"", TransferError::InsufficientResource.code()),
                    ),
                ),
                // Streams may end on their own before ufEnd arrives
                FileStreamMsgType::End => {
                    Handled::err(TransferError::SessionNotFound, json_result(req.req(), true, ""))
                }
                FileStreamMsgType::Cancel => Handled::err(
                    TransferError::SessionNotFound,
                    json_result(
                        req.req(),
                        false,
                        &format!("\"reason\":\"{}\"", TransferError::SessionNotFound.code()),
                    ),
                ),
            };
        };

        let now = self.clock.now_ms();
        let block_max = self.block_max(channel_id);
        let mut ctx = session_ctx(&mut self.manager, ports, now, block_max);
        self.sessions[idx].handle_cmd_frame(info.msg_type, req, &mut ctx)
    }

    /// File/stream block for the session named by the block's stream ID.
    pub fn process_file_block(
        &mut self,
        req: &RicRestMsg,
        channel_id: u32,
        ports: &mut HubPorts<'_>,
    ) -> Handled {
        let stream_id = req.stream_id();
        let Some(idx) = self.find_session(stream_id, None, channel_id) else {
            log::warn!("Exchange: no session for stream {} on chan {}", stream_id, channel_id);
            let reason = TransferError::SessionNotFound;
            return Handled::err(
                reason,
                json_result(
                    req.req(),
                    false,
                    &format!("\"streamID\":{},\"reason\":\"{}\"", stream_id, reason.code()),
                ),
            );
        };
        let now = self.clock.now_ms();
        let block_max = self.block_max(channel_id);
        let mut ctx = session_ctx(&mut self.manager, ports, now, block_max);
        self.sessions[idx].handle_data_frame(req, &mut ctx)
    }

    /// HTTP push entry point: the first block opens (or joins) a session,
    /// every block is then written straight through it.
    pub fn handle_file_upload_block(
        &mut self,
        req: &str,
        block: &FileStreamBlock<'_>,
        channel_id: u32,
        content: ContentType,
        endpoint: &str,
        ports: &mut HubPorts<'_>,
    ) -> Result<(), TransferError> {
        let idx = if block.first_block {
            let len = block.file_len.unwrap_or(block.content_len);
            self.find_or_create_session(
                block.name,
                channel_id,
                content,
                endpoint,
                FlowType::HttpUpload,
                len,
                ports,
            )
            .ok_or(TransferError::InsufficientResource)?
        } else {
            // Ended sessions awaiting reap must not swallow a fresh upload
            self.find_live_session(block.name, channel_id).ok_or_else(|| {
                log::warn!("Exchange: {} push for {} has no session", req, block.name);
                TransferError::SessionNotFound
            })?
        };
        let now = self.clock.now_ms();
        let mut ctx = session_ctx(&mut self.manager, ports, now, 0);
        self.sessions[idx].write_block_direct(block, &mut ctx)
    }

    // ── Session table ─────────────────────────────────────────

    /// By ID when one is given, otherwise by channel and, when `name` is
    /// `Some`, the exact name. An empty name only matches an unnamed session.
    pub fn find_session(&self, stream_id: u32, name: Option<&str>, channel_id: u32) -> Option<usize> {
        if stream_id != STREAM_ID_ANY {
            return self.sessions.iter().position(|s| s.stream_id() == stream_id);
        }
        self.sessions
            .iter()
            .position(|s| name.is_none_or(|n| s.name() == n) && s.channel_id() == channel_id)
    }

    fn find_live_session(&self, name: &str, channel_id: u32) -> Option<usize> {
        self.sessions
            .iter()
            .position(|s| s.is_active() && s.name() == name && s.channel_id() == channel_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn find_or_create_session(
        &mut self,
        name: &str,
        channel_id: u32,
        content: ContentType,
        endpoint: &str,
        flow: FlowType,
        len: u32,
        ports: &mut HubPorts<'_>,
    ) -> Option<usize> {
        // A live session with the same name and channel is a restart
        if let Some(i) = self.find_live_session(name, channel_id) {
            log::warn!(
                "Exchange: restart of {} on chan {} joins stream {}",
                name,
                channel_id,
                self.sessions[i].stream_id()
            );
            return Some(i);
        }

        if self.sessions.len() >= self.config.max_sessions {
            log::warn!(
                "Exchange: session table full ({}), refused {} on chan {}",
                self.sessions.len(),
                name,
                channel_id
            );
            return None;
        }

        let info = StreamInfo {
            stream_id: self.next_stream_id,
            channel_id,
            name: name.into(),
            content,
            len,
        };
        let session = TransferSession::new(
            info,
            flow,
            endpoint,
            &self.config,
            self.clock.now_ms(),
            &mut *ports.files,
            &mut *ports.router,
        );
        ports.events.emit(&TransferEvent::SessionOpened {
            stream_id: session.stream_id(),
            channel_id,
            name: name.into(),
            content,
            flow,
        });
        self.sessions.push(session);

        self.next_stream_id += 1;
        if self.next_stream_id >= STREAM_ID_MAX {
            self.next_stream_id = STREAM_ID_MIN;
        }
        Some(self.sessions.len() - 1)
    }

    // ── Debug ─────────────────────────────────────────────────

    /// JSON array with one engine-stats object per session.
    pub fn debug_json(&self) -> String {
        let parts: Vec<String> = self.sessions.iter().map(TransferSession::debug_json).collect();
        format!("[{}]", parts.join(","))
    }
}
