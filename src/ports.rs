//! Port traits: the boundary between the transfer core and the rest of
//! the device.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ExchangeHub / TransferSession
//! ```
//!
//! The hub never touches flash, the file system or the command router
//! directly. Each is reached through a trait injected at the call site
//! ([`HubPorts`]), so the whole exchange is testable with mock adapters.

use crate::error::TransferError;
use crate::events::TransferEvent;
use crate::filestream::FileStreamBlock;
use crate::filestream::sink::BlockSink;

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond time source. Every deadline in the core is
/// compared against this.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Request router (driven adapter: hub → command dispatch)
// ───────────────────────────────────────────────────────────────

/// Where an API request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSource {
    pub channel_id: u32,
}

impl ApiSource {
    pub const fn new(channel_id: u32) -> Self {
        Self { channel_id }
    }
}

/// REST-style command dispatcher that owns the device's endpoints.
pub trait RequestRouter {
    /// Handle `req` (path plus optional `?query`). `body` carries a
    /// reassembled body when the request was preceded by body elements.
    /// Returns the JSON response, if any.
    fn handle_request(&mut self, req: &str, body: Option<&[u8]>, source: ApiSource)
    -> Option<String>;

    /// Consumer for real-time stream blocks addressed to `endpoint`.
    fn stream_sink(&mut self, endpoint: &str) -> Option<&mut dyn BlockSink>;
}

// ───────────────────────────────────────────────────────────────
// Firmware updater (driven adapter: session → OTA partition)
// ───────────────────────────────────────────────────────────────

/// Receives firmware image blocks.
///
/// `start` is called once, on the first block, before that block is
/// written. `cancel_end(true)` marks the image complete and is refused
/// when fewer bytes than declared arrived; `false` aborts.
pub trait FirmwareUpdater {
    fn start(&mut self, name: &str, len: u32) -> Result<(), TransferError>;

    fn write_block(&mut self, block: &FileStreamBlock<'_>) -> Result<(), TransferError>;

    fn cancel_end(&mut self, is_normal_end: bool);

    /// Whether an image is currently being received.
    fn is_busy(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// File store (driven adapter: session → file system)
// ───────────────────────────────────────────────────────────────

/// One file being written by an upload session.
pub trait FileWriter {
    fn write(&mut self, pos: u32, data: &[u8]) -> Result<(), TransferError>;

    /// Close the file. A `false` end discards what was written.
    fn finish(&mut self, is_normal_end: bool);
}

/// Opens files for upload sessions.
pub trait FileStore {
    fn create(&mut self, name: &str, len: u32) -> Result<Box<dyn FileWriter>, TransferError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: hub → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The hub emits [`TransferEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &TransferEvent);
}

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// Every driven port the hub needs during one call.
pub struct HubPorts<'a> {
    pub router: &'a mut dyn RequestRouter,
    pub firmware: &'a mut dyn FirmwareUpdater,
    pub files: &'a mut dyn FileStore,
    pub events: &'a mut dyn EventSink,
}
