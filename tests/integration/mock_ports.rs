//! Mock port adapters and a wired-up hub for integration tests.
//!
//! `Rig` owns an `ExchangeHub` with one RICFrame channel whose driver
//! records every framed message it is asked to send, plus recording
//! router / file store / event sink adapters and the host-side
//! `OtaUpdater`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use ricxfer::ExchangeHub;
use ricxfer::adapters::time::ManualClock;
use ricxfer::comms::message::{CHANNEL_ID_REST_API, MsgProtocol, MsgType, WireMessage};
use ricxfer::comms::ricframe;
use ricxfer::comms::ricrest::{ElementCode, RicRestMsg};
use ricxfer::comms::transport::Readiness;
use ricxfer::comms::ChannelManager;
use ricxfer::config::{ChannelSettings, ExchangeConfig};
use ricxfer::error::TransferError;
use ricxfer::events::TransferEvent;
use ricxfer::filestream::firmware::OtaUpdater;
use ricxfer::filestream::sink::{BlockSink, MemorySink};
use ricxfer::filestream::{ContentType, FileStreamBlock};
use ricxfer::ports::{ApiSource, EventSink, FileStore, FileWriter, HubPorts, RequestRouter};
use serde_json::Value;

// ── Router ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RouterCall {
    pub req: String,
    pub body: Option<Vec<u8>>,
    pub channel_id: u32,
}

#[derive(Default)]
pub struct MockRouter {
    pub calls: Vec<RouterCall>,
    pub reply: Option<String>,
    pub streams: HashMap<String, MemorySink>,
}

#[allow(dead_code)]
impl MockRouter {
    pub fn with_stream(endpoint: &str) -> Self {
        let mut router = Self::default();
        router.streams.insert(endpoint.into(), MemorySink::new());
        router
    }
}

impl RequestRouter for MockRouter {
    fn handle_request(&mut self, req: &str, body: Option<&[u8]>, source: ApiSource) -> Option<String> {
        self.calls.push(RouterCall {
            req: req.into(),
            body: body.map(<[u8]>::to_vec),
            channel_id: source.channel_id,
        });
        self.reply.clone()
    }

    fn stream_sink(&mut self, endpoint: &str) -> Option<&mut dyn BlockSink> {
        self.streams
            .get_mut(endpoint)
            .map(|s| s as &mut dyn BlockSink)
    }
}

// ── File store ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StoredFile {
    pub data: Vec<u8>,
    pub finished: Option<bool>,
}

/// Files shared with the writers handed to sessions.
#[derive(Default, Clone)]
pub struct MemFiles {
    pub files: Rc<RefCell<HashMap<String, StoredFile>>>,
    pub refuse: bool,
}

#[allow(dead_code)]
impl MemFiles {
    pub fn data(&self, name: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(name).map(|f| f.data.clone())
    }

    pub fn finished(&self, name: &str) -> Option<bool> {
        self.files.borrow().get(name).and_then(|f| f.finished)
    }
}

struct MemWriter {
    name: String,
    files: Rc<RefCell<HashMap<String, StoredFile>>>,
}

impl FileWriter for MemWriter {
    fn write(&mut self, pos: u32, data: &[u8]) -> Result<(), TransferError> {
        let mut files = self.files.borrow_mut();
        let file = files.entry(self.name.clone()).or_default();
        let end = pos as usize + data.len();
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[pos as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn finish(&mut self, is_normal_end: bool) {
        if let Some(f) = self.files.borrow_mut().get_mut(&self.name) {
            f.finished = Some(is_normal_end);
        }
    }
}

impl FileStore for MemFiles {
    fn create(&mut self, name: &str, _len: u32) -> Result<Box<dyn FileWriter>, TransferError> {
        if self.refuse {
            return Err(TransferError::CannotStart);
        }
        self.files
            .borrow_mut()
            .insert(name.into(), StoredFile::default());
        Ok(Box::new(MemWriter {
            name: name.into(),
            files: Rc::clone(&self.files),
        }))
    }
}

// ── Events ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingEvents {
    pub events: Vec<TransferEvent>,
}

impl EventSink for RecordingEvents {
    fn emit(&mut self, event: &TransferEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub type Wire = Arc<Mutex<Vec<WireMessage>>>;

pub struct Rig {
    pub hub: ExchangeHub,
    pub clock: ManualClock,
    pub wire: Wire,
    pub link: Arc<Mutex<Readiness>>,
    pub chan: u32,
    pub router: MockRouter,
    pub firmware: OtaUpdater,
    pub files: MemFiles,
    pub events: RecordingEvents,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(ExchangeConfig::default(), MockRouter::default())
    }

    pub fn with_config(config: ExchangeConfig, router: MockRouter) -> Self {
        let wire: Wire = Arc::default();
        let link = Arc::new(Mutex::new(Readiness::Ready));
        let mut manager = ChannelManager::new();
        let w = Arc::clone(&wire);
        let l = Arc::clone(&link);
        let chan = manager.register_channel(
            ricframe::PROTOCOL_NAME,
            "BLE",
            "RICBLE",
            move |m: &WireMessage| {
                w.lock().unwrap().push(m.clone());
                true
            },
            move |_id: u32| *l.lock().unwrap(),
            ChannelSettings::default(),
        );
        let clock = ManualClock::new(1_000);
        Self {
            hub: ExchangeHub::new(manager, config, clock.clone()),
            clock,
            wire,
            link,
            chan,
            router,
            firmware: OtaUpdater::new(),
            files: MemFiles::default(),
            events: RecordingEvents::default(),
        }
    }

    /// Queue a RICFrame-encoded command carrying `payload` as inbound bytes.
    pub fn send(&mut self, msg_num: u8, protocol: MsgProtocol, payload: &[u8]) {
        let msg = WireMessage::new(self.chan, protocol, u32::from(msg_num), MsgType::Command, payload.to_vec());
        let frame = ricframe::encode_frame(&msg);
        assert!(self.hub.manager_mut().handle_inbound(self.chan, &frame));
    }

    pub fn send_rest(&mut self, msg_num: u8, payload: &[u8]) {
        self.send(msg_num, MsgProtocol::RicRest, payload);
    }

    pub fn tick(&mut self) {
        let mut ports = HubPorts {
            router: &mut self.router,
            firmware: &mut self.firmware,
            files: &mut self.files,
            events: &mut self.events,
        };
        self.hub.service(&mut ports);
    }

    /// Feed one HTTP push block straight into the hub.
    pub fn push_block(
        &mut self,
        block: &FileStreamBlock<'_>,
        content: ContentType,
    ) -> Result<(), TransferError> {
        let mut ports = HubPorts {
            router: &mut self.router,
            firmware: &mut self.firmware,
            files: &mut self.files,
            events: &mut self.events,
        };
        self.hub
            .handle_file_upload_block("fileupload", block, CHANNEL_ID_REST_API, content, "", &mut ports)
    }

    /// Service until the inbound and outbound queues have drained.
    pub fn pump(&mut self) {
        for _ in 0..64 {
            self.tick();
        }
    }

    /// Messages the driver was asked to send, decoded back from RICFrame.
    pub fn take_sent(&mut self) -> Vec<WireMessage> {
        let chan = self.chan;
        self.wire
            .lock()
            .unwrap()
            .drain(..)
            .filter_map(|m| ricframe::decode_frame(chan, &m.payload))
            .collect()
    }

    /// JSON bodies of every RICREST response element sent so far.
    pub fn take_responses(&mut self) -> Vec<(u32, Value)> {
        self.take_sent()
            .into_iter()
            .filter(|m| m.protocol == MsgProtocol::RicRest)
            .filter_map(|m| {
                let rest = RicRestMsg::decode(&m.payload).ok()?;
                (rest.elem_code() == ElementCode::CmdRespJson)
                    .then(|| (m.msg_num, serde_json::from_str(rest.payload_text()).unwrap_or_default()))
            })
            .collect()
    }
}
